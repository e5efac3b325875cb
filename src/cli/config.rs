//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::Cli;
use crate::config::LayerKitConfig;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Merge the optional config file with command-line overrides
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build the effective configuration
    ///
    /// Flags take precedence over the config file, which takes precedence
    /// over built-in defaults.
    pub(crate) fn from_cli(cli: &Cli) -> Result<LayerKitConfig> {
        let mut config = match &cli.config {
            Some(path) => LayerKitConfig::load(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?,
            None => LayerKitConfig::default(),
        };

        let grabcut = &mut config.grabcut;
        if let Some(iterations) = cli.iterations {
            grabcut.iterations = iterations;
        }
        if let Some(max_concurrent) = cli.max_concurrent {
            grabcut.max_concurrent = max_concurrent;
        }
        if let Some(secs) = cli.queue_timeout {
            grabcut.queue_timeout = Duration::try_from_secs_f64(secs)
                .context("Queue timeout must be a non-negative number of seconds")?;
        }
        if let Some(max_dimension) = cli.max_dimension {
            grabcut.max_dimension = max_dimension;
        }

        if cli.no_cache {
            config.cache.enabled = false;
        }
        if let Some(dir) = &cli.cache_dir {
            config.cache.directory = Some(PathBuf::from(dir));
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Reject flag combinations that cannot work
    pub(crate) fn validate_cli(cli: &Cli) -> Result<()> {
        if cli.pattern.is_some() && cli.input.iter().all(|i| !PathBuf::from(i).is_dir()) {
            log::warn!("--pattern only applies to directory inputs");
        }
        if let Some(pattern) = &cli.pattern {
            glob::Pattern::new(pattern)
                .with_context(|| format!("Invalid file pattern '{pattern}'"))?;
        }
        if cli.output.as_deref() == Some("-") {
            anyhow::bail!("Output must be a directory; omit --output to print JSON to stdout");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "layerkit",
            "--iterations",
            "8",
            "--max-concurrent",
            "2",
            "--queue-timeout",
            "1.5",
            "--no-cache",
            "a.png",
        ])
        .unwrap();
        let config = CliConfigBuilder::from_cli(&cli).unwrap();

        assert_eq!(config.grabcut.iterations, 8);
        assert_eq!(config.grabcut.max_concurrent, 2);
        assert_eq!(config.grabcut.queue_timeout, Duration::from_millis(1500));
        assert_eq!(config.grabcut.max_dimension, 1200);
        assert!(!config.cache.enabled);
    }

    #[test]
    fn test_flags_override_config_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "grabcut:\n  iterations: 7\n  max_concurrent: 5").unwrap();

        let path = file.path().to_string_lossy().to_string();
        let cli =
            Cli::try_parse_from(["layerkit", "--config", &path, "--max-concurrent", "1", "a.png"])
                .unwrap();
        let config = CliConfigBuilder::from_cli(&cli).unwrap();

        assert_eq!(config.grabcut.iterations, 7);
        assert_eq!(config.grabcut.max_concurrent, 1);
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let cli = Cli::try_parse_from(["layerkit", "--iterations", "0", "a.png"]).unwrap();
        assert!(CliConfigBuilder::from_cli(&cli).is_err());
    }

    #[test]
    fn test_bad_pattern_is_rejected() {
        let cli = Cli::try_parse_from(["layerkit", "--pattern", "[", "."]).unwrap();
        assert!(CliConfigBuilder::validate_cli(&cli).is_err());
    }
}
