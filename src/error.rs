//! Error types for layer decomposition operations

use std::time::Duration;
use thiserror::Error;

/// Result type alias for layer decomposition operations
pub type Result<T> = std::result::Result<T, LayerKitError>;

/// Error types for layer decomposition operations
///
/// The variants fall into four groups that callers treat differently:
/// input validation (`InvalidInput`, `UnsupportedFormat`, `Processing` for
/// undecodable images), capacity exhaustion (`QueueFull`), best-effort
/// side channels (`Cache`) and everything else.
#[derive(Error, Debug)]
pub enum LayerKitError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Rejected upload (empty, too large, malformed request)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unsupported content type or file format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Pipeline failure for a single request (decode failure, solver failure)
    #[error("Processing error: {0}")]
    Processing(String),

    /// No processing slot became available within the queue timeout
    #[error("Processing queue full: no slot available within {}ms", timeout.as_millis())]
    QueueFull {
        /// How long the request waited before giving up
        timeout: Duration,
    },

    /// Result cache failure (never fatal to a request)
    #[error("Cache error: {0}")]
    Cache(String),

    /// JSON serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LayerKitError {
    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new unsupported format error
    pub fn unsupported_format<S: Into<String>>(format: S) -> Self {
        Self::UnsupportedFormat(format.into())
    }

    /// Create a new processing error
    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    /// Create a new cache error
    pub fn cache<S: Into<String>>(msg: S) -> Self {
        Self::Cache(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a queue-full error for the given wait budget
    #[must_use]
    pub fn queue_full(timeout: Duration) -> Self {
        Self::QueueFull { timeout }
    }

    /// Whether this error reports capacity exhaustion rather than a bad request
    #[must_use]
    pub fn is_queue_full(&self) -> bool {
        matches!(self, Self::QueueFull { .. })
    }

    /// Whether retrying the same request later may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::QueueFull { .. } | Self::Io(_) | Self::Cache(_))
    }

    // Contextual error creators

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }

    /// Create processing error with stage context
    pub fn processing_stage_error(stage: &str, details: &str, input_info: Option<&str>) -> Self {
        let input_context = match input_info {
            Some(info) => format!(" (input: {})", info),
            None => String::new(),
        };

        Self::Processing(format!(
            "Processing failed at stage '{}'{}: {}",
            stage, input_context, details
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_error_creation() {
        let err = LayerKitError::invalid_config("test config error");
        assert!(matches!(err, LayerKitError::InvalidConfig(_)));

        let err = LayerKitError::unsupported_format("image/gif");
        assert!(matches!(err, LayerKitError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_error_display() {
        let err = LayerKitError::invalid_config("iterations must be positive");
        assert_eq!(
            err.to_string(),
            "Invalid configuration: iterations must be positive"
        );

        let err = LayerKitError::queue_full(Duration::from_millis(100));
        assert_eq!(
            err.to_string(),
            "Processing queue full: no slot available within 100ms"
        );
    }

    #[test]
    fn test_queue_full_is_distinct_from_processing() {
        let full = LayerKitError::queue_full(Duration::from_secs(30));
        let failed = LayerKitError::processing("decode failed");

        assert!(full.is_queue_full());
        assert!(full.is_retryable());
        assert!(!failed.is_queue_full());
        assert!(!failed.is_retryable());
    }

    #[test]
    fn test_contextual_errors() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let path = Path::new("/etc/layerkit.yaml");
        let err = LayerKitError::file_io_error("read config file", path, &io_error);
        let error_string = err.to_string();
        assert!(error_string.contains("read config file"));
        assert!(error_string.contains("/etc/layerkit.yaml"));

        let err = LayerKitError::config_value_error("iterations", 0, "1-50", Some(5));
        let error_string = err.to_string();
        assert!(error_string.contains("iterations"));
        assert!(error_string.contains("1-50"));
        assert!(error_string.contains("Recommended: 5"));

        let err = LayerKitError::processing_stage_error("load", "unknown format", Some("12 bytes"));
        let error_string = err.to_string();
        assert!(error_string.contains("'load'"));
        assert!(error_string.contains("12 bytes"));
    }
}
