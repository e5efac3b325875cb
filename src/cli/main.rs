//! Layer decomposition CLI tool
//!
//! Command-line front-end that submits every input to the layer service at
//! once and lets the slot pool bound the actual work.

use super::config::CliConfigBuilder;
use crate::{
    cache::{format_size, FileResultCache, ResultCache},
    config::LayerKitConfig,
    processor::LayerProcessor,
    services::{ConsoleProgressReporter, LayerResponse, LayerService, MaskEncoder},
    tracing_config::{init_cli_tracing, spans, TracingFormat},
    types::{LayerResult, ProcessOptions},
    LayerKitError,
};
use anyhow::{Context, Result};
use clap::Parser;
use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Foreground/background layer decomposition
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "layerkit")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Input image files or directories
    #[arg(
        value_name = "INPUT",
        required_unless_present_any = &["lookup", "clear_cache", "show_cache_dir"]
    )]
    pub input: Vec<String>,

    /// Output directory for JSON results
    ///
    /// Defaults to stdout for a single input and to each input's directory otherwise.
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<String>,

    /// Also write <stem>.foreground.png and <stem>.background.png masks
    #[arg(long)]
    pub export_masks: bool,

    /// Keep only the largest foreground region
    #[arg(long)]
    pub foreground_only: bool,

    /// YAML or JSON configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Base solver iterations
    #[arg(long)]
    pub iterations: Option<u32>,

    /// Maximum images processed at once
    #[arg(long)]
    pub max_concurrent: Option<usize>,

    /// Seconds an input may wait for a processing slot
    #[arg(long, value_name = "SECS")]
    pub queue_timeout: Option<f64>,

    /// Longest side of the working image
    #[arg(long)]
    pub max_dimension: Option<u32>,

    /// Do not read or write the result cache
    #[arg(long)]
    pub no_cache: bool,

    /// Use custom cache directory
    #[arg(long, value_name = "PATH")]
    pub cache_dir: Option<String>,

    /// Print the cached result for a content fingerprint and exit
    #[arg(long, value_name = "FINGERPRINT")]
    pub lookup: Option<String>,

    /// Remove all cached results and exit
    #[arg(long)]
    pub clear_cache: bool,

    /// Show current cache directory and exit
    #[arg(long)]
    pub show_cache_dir: bool,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE with per-stage progress)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Process directories recursively
    #[arg(short, long)]
    pub recursive: bool,

    /// Pattern for directory inputs (e.g., "*.jpg")
    #[arg(long)]
    pub pattern: Option<String>,
}

/// How each input ended
#[derive(Debug, Default)]
struct BatchSummary {
    processed: usize,
    cached: usize,
    queue_full: usize,
    failed: usize,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    let session_id = init_cli_tracing(cli.verbose, TracingFormat::Console)
        .context("Failed to initialize tracing")?;

    CliConfigBuilder::validate_cli(&cli).context("Invalid CLI arguments")?;
    let config = CliConfigBuilder::from_cli(&cli).context("Failed to build configuration")?;

    if cli.show_cache_dir {
        return show_current_cache_dir(&config).await;
    }
    if cli.clear_cache {
        return clear_cache(&config).await;
    }
    if let Some(fingerprint) = &cli.lookup {
        return lookup(&config, fingerprint).await;
    }

    if cli.input.is_empty() {
        anyhow::bail!("At least one input is required");
    }

    let service = build_service(&cli, &config)?;
    let files = collect_inputs(&cli)?;
    if files.is_empty() {
        warn!("No supported image files found in the provided inputs");
        return Ok(());
    }

    let start_time = Instant::now();
    let span = spans::session(&session_id, files.len());
    let summary = process_inputs(&cli, &service, &files).instrument(span).await?;

    info!(
        "Processed {} image(s) in {:.2}s",
        summary.processed,
        start_time.elapsed().as_secs_f64()
    );
    if files.len() > 1 {
        info!("📊 Batch summary:");
        info!("  ├─ Processed: {}", summary.processed);
        info!("  ├─ From cache: {}", summary.cached);
        info!("  ├─ Queue full: {}", summary.queue_full);
        info!("  └─ Failed: {}", summary.failed);
    }

    if summary.queue_full + summary.failed > 0 {
        anyhow::bail!(
            "{} input(s) were not processed ({} queue full, {} failed)",
            summary.queue_full + summary.failed,
            summary.queue_full,
            summary.failed
        );
    }
    Ok(())
}

fn build_service(cli: &Cli, config: &LayerKitConfig) -> Result<LayerService> {
    let mut processor =
        LayerProcessor::new(&config.grabcut).context("Failed to create layer processor")?;
    if cli.verbose >= 2 {
        processor = processor.with_progress_reporter(Arc::new(ConsoleProgressReporter::new(true)));
    }

    let mut service = LayerService::new(processor, config.upload.clone());
    if config.cache.enabled {
        match FileResultCache::from_config(&config.cache) {
            Ok(cache) => service = service.with_cache(Arc::new(cache)),
            Err(e) => warn!("Result cache unavailable, continuing without it: {}", e),
        }
    }
    Ok(service)
}

fn open_cache(config: &LayerKitConfig) -> Result<FileResultCache> {
    FileResultCache::from_config(&config.cache).context("Failed to open result cache")
}

async fn show_current_cache_dir(config: &LayerKitConfig) -> Result<()> {
    let cache = open_cache(config)?;
    let stats = cache.stats().await?;

    println!("📁 Current cache directory:");
    println!("   Path: {}", cache.cache_dir().display());
    println!("   Entries: {} ({})", stats.entries, format_size(stats.size_bytes));
    if config.cache.directory.is_some() {
        println!("   Source: --cache-dir or configuration file");
    } else if std::env::var(crate::cache::CACHE_DIR_ENV).is_ok() {
        println!("   Source: {} environment variable", crate::cache::CACHE_DIR_ENV);
    } else {
        println!("   Source: XDG cache directory specification");
    }
    Ok(())
}

async fn clear_cache(config: &LayerKitConfig) -> Result<()> {
    let cache = open_cache(config)?;
    println!("🗑️  Clearing result cache...");
    let removed = cache.clear().await.context("Failed to clear cache")?;
    if removed == 0 {
        println!("💡 Cache was already empty");
    } else {
        println!("✅ Removed {removed} cached result(s)");
    }
    println!("   Cache location: {}", cache.cache_dir().display());
    Ok(())
}

async fn lookup(config: &LayerKitConfig, fingerprint: &str) -> Result<()> {
    let cache = open_cache(config)?;
    let key = crate::cache::cache_key(fingerprint, ProcessOptions::default());
    match cache.get(&key).await? {
        Some(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        },
        None => anyhow::bail!("No cached result for fingerprint {fingerprint}"),
    }
}

/// Expand files and directories into a sorted list of image files
fn collect_inputs(cli: &Cli) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in &cli.input {
        let path = PathBuf::from(input);
        if path.is_file() {
            if is_image_file(&path) {
                files.push(path);
            } else {
                warn!("Skipping unsupported file: {}", path.display());
            }
        } else if path.is_dir() {
            files.extend(find_image_files(&path, cli.recursive, cli.pattern.as_deref())?);
        } else {
            anyhow::bail!(
                "Input path does not exist or is not accessible: {}",
                path.display()
            );
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

const PROGRESS_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}";

async fn process_inputs(
    cli: &Cli,
    service: &LayerService,
    files: &[PathBuf],
) -> Result<BatchSummary> {
    let output_dir = match &cli.output {
        Some(output) => {
            let dir = PathBuf::from(output);
            if dir.is_file() {
                anyhow::bail!(
                    "Output path exists and is a file, not a directory: {}",
                    dir.display()
                );
            }
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
            Some(dir)
        },
        None => None,
    };

    let progress = if files.len() > 1 {
        let pb = ProgressBar::new(files.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(PROGRESS_TEMPLATE)
                .context("Invalid progress bar template")?
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    let options = ProcessOptions {
        foreground_only: cli.foreground_only,
    };
    let print_to_stdout = output_dir.is_none() && files.len() == 1;

    // Submit everything at once; the slot pool decides what runs
    let tasks = files.iter().map(|file| {
        let progress = progress.clone();
        async move {
            let outcome = service
                .process_file(file, options)
                .instrument(spans::file_processing(file))
                .await;
            if let Some(pb) = &progress {
                pb.inc(1);
            }
            (file, outcome)
        }
    });
    let outcomes = join_all(tasks).await;

    let mut summary = BatchSummary::default();
    for (file, outcome) in outcomes {
        match outcome {
            Ok(response) => {
                let written =
                    write_outputs(cli, file, output_dir.as_deref(), &response, print_to_stdout);
                if let Err(e) = written {
                    error!("❌ Failed to write results for {}: {:#}", file.display(), e);
                    summary.failed += 1;
                    continue;
                }
                summary.processed += 1;
                if response.from_cache {
                    summary.cached += 1;
                }
            },
            Err(e) if e.is_queue_full() => {
                warn!("⏳ Queue full, not processed: {} ({})", file.display(), e);
                summary.queue_full += 1;
            },
            Err(e) => {
                report_failure(file, &e);
                summary.failed += 1;
            },
        }
    }

    if let Some(pb) = progress {
        pb.finish_with_message(format!(
            "Completed! Processed: {}, Queue full: {}, Failed: {}",
            summary.processed, summary.queue_full, summary.failed
        ));
    }
    Ok(summary)
}

fn report_failure(file: &Path, error: &LayerKitError) {
    error!("❌ Failed to process {}: {}", file.display(), error);
}

fn write_outputs(
    cli: &Cli,
    input: &Path,
    output_dir: Option<&Path>,
    response: &LayerResponse,
    print_to_stdout: bool,
) -> Result<()> {
    let json = serde_json::to_string_pretty(&response.result)?;
    let target_dir = output_dir
        .map(Path::to_path_buf)
        .or_else(|| input.parent().map(Path::to_path_buf))
        .unwrap_or_default();

    if print_to_stdout {
        println!("{json}");
    } else {
        let path = output_path(input, &target_dir, "layers.json");
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("✅ {} -> {}", input.display(), path.display());
    }

    if cli.export_masks {
        export_masks(input, &target_dir, &response.result)?;
    }
    Ok(())
}

fn export_masks(input: &Path, dir: &Path, result: &LayerResult) -> Result<()> {
    for layer in &result.layers {
        let suffix = match layer.layer_type {
            crate::types::LayerType::Foreground => "foreground.png",
            crate::types::LayerType::Background => "background.png",
        };
        let mask = MaskEncoder::from_png_base64(&layer.mask)?;
        let png = MaskEncoder::to_png(&mask)?;
        let path = output_path(input, dir, suffix);
        std::fs::write(&path, png).with_context(|| format!("Failed to write {}", path.display()))?;
    }
    Ok(())
}

/// `<dir>/<input stem>.<suffix>`
fn output_path(input: &Path, dir: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    dir.join(format!("{stem}.{suffix}"))
}

fn find_image_files(dir: &Path, recursive: bool, pattern: Option<&str>) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    if recursive {
        for entry in walkdir::WalkDir::new(dir) {
            let entry = entry?;
            if entry.file_type().is_file() {
                let path = entry.path();
                if is_image_file(path) && matches_pattern(path, pattern) {
                    files.push(path.to_path_buf());
                }
            }
        }
    } else {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                let path = entry.path();
                if is_image_file(&path) && matches_pattern(&path, pattern) {
                    files.push(path);
                }
            }
        }
    }

    Ok(files)
}

/// Check if file is an accepted image based on extension
fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

/// Check if file matches the given pattern
fn matches_pattern(path: &Path, pattern: Option<&str>) -> bool {
    match pattern {
        Some(pat) => {
            if let Some(filename) = path.file_name().and_then(|n| n.to_str()) {
                glob::Pattern::new(pat)
                    .map(|p| p.matches(filename))
                    .unwrap_or(false)
            } else {
                false
            }
        },
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_find_image_files_with_pattern_and_recursion() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.png"), b"").unwrap();
        std::fs::write(dir.path().join("b.JPG"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("c.png"), b"").unwrap();

        let flat = find_image_files(dir.path(), false, None).unwrap();
        assert_eq!(flat.len(), 2);

        let deep = find_image_files(dir.path(), true, Some("*.png")).unwrap();
        assert_eq!(deep.len(), 2);
        assert!(deep.iter().all(|p| p.extension().unwrap() == "png"));
    }

    #[test]
    fn test_output_path() {
        let path = output_path(Path::new("/in/photo.jpg"), Path::new("/out"), "layers.json");
        assert_eq!(path, PathBuf::from("/out/photo.layers.json"));
    }

    #[test]
    fn test_inputs_required_unless_cache_command() {
        assert!(Cli::try_parse_from(["layerkit"]).is_err());
        assert!(Cli::try_parse_from(["layerkit", "--show-cache-dir"]).is_ok());
        assert!(Cli::try_parse_from(["layerkit", "--lookup", "abc"]).is_ok());
    }
}
