//! Configuration types for layer decomposition
//!
//! Configuration is a plain value passed into each component's constructor.
//! Nothing in the crate reads configuration from global state.

use crate::error::{LayerKitError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Largest working dimension before the pipeline downsamples
pub const DEFAULT_MAX_DIMENSION: u32 = 1200;

/// Segmentation and concurrency tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrabCutConfig {
    /// Base solver iteration count; the driver adapts it per complexity level
    pub iterations: u32,

    /// Border width in pixels for rectangle initialization
    pub border_size: u32,

    /// Maximum number of pipelines running at once
    pub max_concurrent: usize,

    /// How long a request may wait for a processing slot
    #[serde(with = "duration_secs")]
    pub queue_timeout: Duration,

    /// Longest working-image side; larger inputs are downsampled
    pub max_dimension: u32,
}

impl Default for GrabCutConfig {
    fn default() -> Self {
        Self {
            iterations: 5,
            border_size: 10,
            max_concurrent: 3,
            queue_timeout: Duration::from_secs(30),
            max_dimension: DEFAULT_MAX_DIMENSION,
        }
    }
}

impl GrabCutConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> GrabCutConfigBuilder {
        GrabCutConfigBuilder::default()
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - `iterations` outside 1-50
    /// - `max_concurrent` of zero
    /// - `max_dimension` below 16
    /// - zero `queue_timeout`
    pub fn validate(&self) -> Result<()> {
        if !(1..=50).contains(&self.iterations) {
            return Err(LayerKitError::config_value_error(
                "iterations",
                self.iterations,
                "1-50",
                Some(5),
            ));
        }

        if self.max_concurrent == 0 {
            return Err(LayerKitError::config_value_error(
                "max_concurrent",
                self.max_concurrent,
                "1 or more",
                Some(3),
            ));
        }

        if self.max_dimension < 16 {
            return Err(LayerKitError::config_value_error(
                "max_dimension",
                self.max_dimension,
                "16 or more",
                Some(DEFAULT_MAX_DIMENSION),
            ));
        }

        if self.queue_timeout.is_zero() {
            return Err(LayerKitError::invalid_config(
                "queue_timeout must be greater than zero",
            ));
        }

        Ok(())
    }
}

/// Builder for `GrabCutConfig`
#[derive(Debug, Default)]
pub struct GrabCutConfigBuilder {
    config: GrabCutConfig,
}

impl GrabCutConfigBuilder {
    #[must_use]
    pub fn iterations(mut self, iterations: u32) -> Self {
        self.config.iterations = iterations;
        self
    }

    #[must_use]
    pub fn border_size(mut self, border_size: u32) -> Self {
        self.config.border_size = border_size;
        self
    }

    #[must_use]
    pub fn max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.config.max_concurrent = max_concurrent;
        self
    }

    #[must_use]
    pub fn queue_timeout(mut self, queue_timeout: Duration) -> Self {
        self.config.queue_timeout = queue_timeout;
        self
    }

    #[must_use]
    pub fn max_dimension(mut self, max_dimension: u32) -> Self {
        self.config.max_dimension = max_dimension;
        self
    }

    /// Validate and return the configuration
    ///
    /// # Errors
    /// Any error reported by [`GrabCutConfig::validate`].
    pub fn build(self) -> Result<GrabCutConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Upload acceptance rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Maximum accepted upload size in bytes
    pub max_size: u64,

    /// Accepted MIME types (compared case-insensitively)
    pub allowed_types: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_size: 10 * 1024 * 1024, // 10MB
            allowed_types: vec![
                "image/jpeg".to_string(),
                "image/png".to_string(),
                "image/jpg".to_string(),
            ],
        }
    }
}

impl UploadConfig {
    /// Whether the MIME type is accepted
    #[must_use]
    pub fn allows(&self, content_type: &str) -> bool {
        let wanted = content_type.trim().to_ascii_lowercase();
        self.allowed_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(&wanted))
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(LayerKitError::invalid_config(
                "upload max_size must be greater than zero",
            ));
        }
        if self.allowed_types.is_empty() {
            return Err(LayerKitError::invalid_config(
                "upload allowed_types must list at least one MIME type",
            ));
        }
        Ok(())
    }
}

/// Result cache settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether results are cached at all
    pub enabled: bool,

    /// Entry lifetime
    #[serde(with = "duration_secs")]
    pub ttl: Duration,

    /// Cache directory override (defaults to the user cache directory)
    pub directory: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(24 * 60 * 60),
            directory: None,
        }
    }
}

/// Top-level configuration file layout
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerKitConfig {
    pub grabcut: GrabCutConfig,
    pub upload: UploadConfig,
    pub cache: CacheConfig,
}

impl LayerKitConfig {
    /// Load configuration from a YAML or JSON file
    ///
    /// The format is chosen by extension (`.json` is JSON, anything else YAML).
    /// Missing sections and fields take their defaults.
    ///
    /// # Errors
    /// - File cannot be read
    /// - File content cannot be parsed
    /// - Parsed values fail validation
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| LayerKitError::file_io_error("read config file", path, &e))?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let config: Self = if is_json {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content).map_err(|e| {
                LayerKitError::invalid_config(format!(
                    "Failed to parse '{}': {}",
                    path.display(),
                    e
                ))
            })?
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file is absent or invalid
    #[must_use]
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path.as_ref()) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(
                    path = %path.as_ref().display(),
                    error = %e,
                    "Falling back to default configuration"
                );
                Self::default()
            },
        }
    }

    /// Validate every section
    ///
    /// # Errors
    /// The first section error encountered.
    pub fn validate(&self) -> Result<()> {
        self.grabcut.validate()?;
        self.upload.validate()?;
        Ok(())
    }
}

/// Durations are written as (fractional) seconds in configuration files
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(
        value: &Duration,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
