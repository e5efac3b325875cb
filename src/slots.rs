//! Bounded pool of processing slots
//!
//! Waiters are served in arrival order (tokio's semaphore is fair) and give
//! up after a fixed timeout.

use crate::error::{LayerKitError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

/// Fixed-capacity slot pool with timed acquisition
#[derive(Debug, Clone)]
pub struct SlotPool {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    timeout: Duration,
}

/// A held slot; released when dropped
#[derive(Debug)]
pub struct SlotGuard {
    _permit: OwnedSemaphorePermit,
}

impl SlotPool {
    #[must_use]
    pub fn new(capacity: usize, timeout: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            timeout,
        }
    }

    /// Wait up to the configured timeout for a free slot
    ///
    /// # Errors
    /// - `QueueFull` when no slot frees up in time
    pub async fn acquire(&self) -> Result<SlotGuard> {
        match tokio::time::timeout(self.timeout, self.semaphore.clone().acquire_owned()).await {
            Ok(Ok(permit)) => {
                debug!(available = self.available(), "Acquired processing slot");
                Ok(SlotGuard { _permit: permit })
            },
            Ok(Err(_closed)) => Err(LayerKitError::internal("Slot pool was closed")),
            Err(_elapsed) => {
                warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    capacity = self.capacity,
                    "Processing queue full"
                );
                Err(LayerKitError::queue_full(self.timeout))
            },
        }
    }

    /// Slots currently free
    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
