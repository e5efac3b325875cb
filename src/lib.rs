#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # LayerKit
//!
//! Splits an image into two layers, foreground and background, using a
//! complexity-aware GrabCut pipeline.
//!
//! Each image is classified first (edge density, color variance, skin-tone
//! coverage). The classification picks the initialization strategy, the
//! iteration count and the post-processing applied to the segmentation.
//! Every result carries both layers as binary PNG masks at the original
//! resolution, plus their bounding boxes and confidences.
//!
//! ## Features
//!
//! - **Adaptive segmentation**: rectangle initialization for simple images,
//!   saliency-seeded trimaps for cluttered ones
//! - **Portrait handling**: skin-tone detection and mask enhancement
//! - **Bounded concurrency**: a fixed number of processing slots with a queue timeout
//! - **Result caching**: content-addressed results in memory or on disk
//! - **CLI Integration**: Optional command-line interface (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use layerkit::{GrabCutConfig, LayerProcessor, ProcessOptions};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = GrabCutConfig::builder()
//!     .iterations(5)
//!     .max_concurrent(2)
//!     .build()?;
//! let processor = LayerProcessor::new(&config)?;
//!
//! let result = processor
//!     .process_path("photo.jpg", None, ProcessOptions::default())
//!     .await?;
//! let foreground = result.foreground().expect("foreground layer");
//! println!("{:?} at {:.2}", foreground.bounding_box, foreground.confidence);
//! # Ok(())
//! # }
//! ```
//!
//! ## Service Usage
//!
//! [`LayerService`] adds upload validation and result caching on top of the
//! processor:
//!
//! ```rust,no_run
//! use layerkit::{
//!     GrabCutConfig, ImageUpload, LayerProcessor, LayerService, MemoryResultCache,
//!     ProcessOptions, UploadConfig,
//! };
//! use std::{sync::Arc, time::Duration};
//!
//! # async fn example(bytes: Vec<u8>) -> anyhow::Result<()> {
//! let processor = LayerProcessor::new(&GrabCutConfig::default())?;
//! let service = LayerService::new(processor, UploadConfig::default())
//!     .with_cache(Arc::new(MemoryResultCache::new(Duration::from_secs(3600))));
//!
//! let upload = ImageUpload::new(bytes).with_content_type("image/png");
//! let response = service.process_upload(upload, ProcessOptions::default()).await?;
//! println!("cached: {}", response.from_cache);
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `cli` (default): Command-line interface, progress bars and tracing subscriber setup
//! - `tracing-json`: JSON log output for the CLI
//!
//! To use only as a library without CLI dependencies:
//!
//! ```toml
//! [dependencies]
//! layerkit = { version = "0.1", default-features = false }
//! ```

pub mod analysis;
pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod driver;
pub mod error;
pub mod mask;
pub mod mask_processor;
pub mod pipeline;
pub mod primitives;
pub mod processor;
pub mod segmentation;
pub mod services;
pub mod slots;
pub mod tracing_config;
pub mod types;

// Public API exports
pub use analysis::{ComplexityClassifier, FaceDetector, PortraitDetector, SaliencyEstimator};
pub use cache::{cache_key, format_size, FileResultCache, MemoryResultCache, ResultCache};
pub use config::{CacheConfig, GrabCutConfig, GrabCutConfigBuilder, LayerKitConfig, UploadConfig};
pub use driver::{InitMode, SegmentationDriver};
pub use error::{LayerKitError, Result};
pub use mask::{BinaryMask, Trimap, TrimapLabel};
pub use mask_processor::MaskProcessor;
pub use pipeline::{LayerOutcome, ProcessingReport, SegmentationPipeline};
pub use processor::LayerProcessor;
pub use segmentation::{GrabCutSolver, SegmentationSolver, SolverInit};
pub use services::{
    ConsoleProgressReporter, ImageIOService, ImageUpload, LayerResponse, LayerService,
    MaskEncoder, NoOpProgressReporter, ProcessingStage, ProgressReporter, ProgressUpdate,
};
pub use slots::SlotPool;
pub use types::{
    BoundingBox, ComplexityInfo, ComplexityLevel, Layer, LayerResult, LayerType, ProcessOptions,
    Rect,
};

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, TracingConfig, TracingFormat};

use tokio::io::AsyncRead;

/// Decompose an in-memory encoded image with a one-off processor
///
/// Convenient for single images; long-lived callers should keep a
/// [`LayerProcessor`] so concurrent requests share one slot pool.
///
/// # Examples
///
/// ```rust,no_run
/// use layerkit::{decompose_bytes, GrabCutConfig, ProcessOptions};
///
/// # async fn example(bytes: Vec<u8>) -> anyhow::Result<()> {
/// let config = GrabCutConfig::default();
/// let result = decompose_bytes(bytes, &config, ProcessOptions::default()).await?;
/// assert_eq!(result.layers.len(), 2);
/// # Ok(())
/// # }
/// ```
pub async fn decompose_bytes(
    bytes: Vec<u8>,
    config: &GrabCutConfig,
    options: ProcessOptions,
) -> Result<LayerResult> {
    let processor = LayerProcessor::new(config)?;
    let fingerprint = ImageIOService::fingerprint(&bytes);
    processor.process_bytes(bytes, &fingerprint, options).await
}

/// Decompose an image read from an async stream
pub async fn decompose_reader<R: AsyncRead + Unpin>(
    mut reader: R,
    config: &GrabCutConfig,
    options: ProcessOptions,
) -> Result<LayerResult> {
    let mut buffer = Vec::new();
    tokio::io::AsyncReadExt::read_to_end(&mut reader, &mut buffer)
        .await
        .map_err(|e| LayerKitError::processing(format!("Failed to read from stream: {}", e)))?;

    decompose_bytes(buffer, config, options).await
}
