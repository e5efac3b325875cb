//! Progress reporting service
//!
//! This module separates progress reporting concerns from the pipeline,
//! allowing different frontends to implement their own progress handling.

use instant::Instant;
use serde::{Deserialize, Serialize};

/// States of the layer decomposition pipeline, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStage {
    /// Waiting for a processing slot
    AcquireSlot,
    /// Decoding the input image
    Load,
    /// Downscaling to the working resolution
    SmartResize,
    /// Measuring scene complexity
    Classify,
    /// Seeding the solver with a fixed rectangle
    RectInit,
    /// Seeding the solver from the saliency map
    SaliencyInit,
    /// Running the segmentation solver
    Segment,
    ExtractForeground,
    PortraitEnhance,
    DetailRefine,
    MorphologyOptimize,
    RefineEdges,
    /// Scaling the mask back to the input resolution
    RescaleToOriginal,
    KeepLargest,
    #[serde(rename = "compute_bbox_and_confidence")]
    ComputeBBoxAndConfidence,
    EncodeLayers,
    ReleaseSlot,
}

impl ProcessingStage {
    /// Get a human-readable description of the processing stage
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            ProcessingStage::AcquireSlot => "Waiting for a processing slot",
            ProcessingStage::Load => "Loading input image",
            ProcessingStage::SmartResize => "Resizing to working resolution",
            ProcessingStage::Classify => "Analyzing scene complexity",
            ProcessingStage::RectInit => "Initializing from rectangle",
            ProcessingStage::SaliencyInit => "Initializing from saliency",
            ProcessingStage::Segment => "Segmenting foreground",
            ProcessingStage::ExtractForeground => "Extracting foreground mask",
            ProcessingStage::PortraitEnhance => "Enhancing portrait mask",
            ProcessingStage::DetailRefine => "Refining edge details",
            ProcessingStage::MorphologyOptimize => "Cleaning up mask",
            ProcessingStage::RefineEdges => "Smoothing mask edges",
            ProcessingStage::RescaleToOriginal => "Restoring original size",
            ProcessingStage::KeepLargest => "Keeping largest region",
            ProcessingStage::ComputeBBoxAndConfidence => "Computing bounding box and confidence",
            ProcessingStage::EncodeLayers => "Encoding layers",
            ProcessingStage::ReleaseSlot => "Releasing processing slot",
        }
    }

    /// Get the typical progress percentage for this stage
    #[must_use]
    pub fn progress_percentage(&self) -> u8 {
        match self {
            ProcessingStage::AcquireSlot => 0,
            ProcessingStage::Load => 5,
            ProcessingStage::SmartResize => 10,
            ProcessingStage::Classify => 15,
            ProcessingStage::RectInit | ProcessingStage::SaliencyInit => 20,
            ProcessingStage::Segment => 70,
            ProcessingStage::ExtractForeground => 72,
            ProcessingStage::PortraitEnhance => 75,
            ProcessingStage::DetailRefine => 78,
            ProcessingStage::MorphologyOptimize => 82,
            ProcessingStage::RefineEdges => 85,
            ProcessingStage::RescaleToOriginal => 88,
            ProcessingStage::KeepLargest => 90,
            ProcessingStage::ComputeBBoxAndConfidence => 93,
            ProcessingStage::EncodeLayers => 98,
            ProcessingStage::ReleaseSlot => 100,
        }
    }
}

/// Progress update containing stage and timing information
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Current processing stage
    pub stage: ProcessingStage,
    /// Progress percentage (0-100)
    pub progress: u8,
    /// Human-readable stage description
    pub description: String,
    /// Elapsed time since processing started (milliseconds)
    pub elapsed_ms: u64,
}

impl ProgressUpdate {
    #[must_use]
    pub fn new(stage: ProcessingStage, start_time: Instant) -> Self {
        Self {
            progress: stage.progress_percentage(),
            description: stage.description().to_string(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
            stage,
        }
    }
}

/// Trait for reporting progress during layer decomposition
pub trait ProgressReporter: Send + Sync {
    /// Report a progress update
    fn report_progress(&self, update: ProgressUpdate);

    /// Report an error during processing
    ///
    /// # Arguments
    /// * `stage` - Stage where error occurred
    /// * `error` - Error description
    fn report_error(&self, stage: ProcessingStage, error: &str);
}

/// No-op progress reporter that discards all progress updates
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _update: ProgressUpdate) {}

    fn report_error(&self, _stage: ProcessingStage, _error: &str) {}
}

/// Console progress reporter that logs progress through `log`
pub struct ConsoleProgressReporter {
    verbose: bool,
}

impl ConsoleProgressReporter {
    /// Create a new console progress reporter
    ///
    /// # Arguments
    /// * `verbose` - Whether to include elapsed time
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        if self.verbose {
            log::info!(
                "[{}%] {} ({}ms elapsed)",
                update.progress,
                update.description,
                update.elapsed_ms
            );
        } else {
            log::info!("[{}%] {}", update.progress, update.description);
        }
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        log::error!("❌ Error during {}: {}", stage.description(), error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_is_monotonic_in_pipeline_order() {
        let order = [
            ProcessingStage::AcquireSlot,
            ProcessingStage::Load,
            ProcessingStage::SmartResize,
            ProcessingStage::Classify,
            ProcessingStage::SaliencyInit,
            ProcessingStage::Segment,
            ProcessingStage::ExtractForeground,
            ProcessingStage::PortraitEnhance,
            ProcessingStage::DetailRefine,
            ProcessingStage::MorphologyOptimize,
            ProcessingStage::RefineEdges,
            ProcessingStage::RescaleToOriginal,
            ProcessingStage::KeepLargest,
            ProcessingStage::ComputeBBoxAndConfidence,
            ProcessingStage::EncodeLayers,
            ProcessingStage::ReleaseSlot,
        ];
        for pair in order.windows(2) {
            assert!(pair[0].progress_percentage() < pair[1].progress_percentage());
        }
    }

    #[test]
    fn test_progress_update_fields() {
        let update = ProgressUpdate::new(ProcessingStage::Segment, Instant::now());
        assert_eq!(update.progress, 70);
        assert_eq!(update.description, "Segmenting foreground");
    }

    #[test]
    fn test_stage_serializes_snake_case() {
        let json = serde_json::to_string(&ProcessingStage::ComputeBBoxAndConfidence).unwrap();
        assert_eq!(json, "\"compute_bbox_and_confidence\"");
    }
}
