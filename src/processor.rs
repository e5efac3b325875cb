//! Slot-gated asynchronous front of the segmentation pipeline
//!
//! [`LayerProcessor`] is the entry point used by both the layer service and
//! the CLI. It waits for a processing slot, then runs the synchronous
//! [`SegmentationPipeline`] on the blocking thread pool. The slot is owned by
//! the blocking task, so it is returned on success, on error and when the
//! pipeline panics.

use crate::config::GrabCutConfig;
use crate::error::{LayerKitError, Result};
use crate::pipeline::{LayerOutcome, SegmentationPipeline, StageTracker};
use crate::segmentation::SegmentationSolver;
use crate::services::{ImageIOService, NoOpProgressReporter, ProcessingStage, ProgressReporter};
use crate::slots::SlotPool;
use crate::tracing_config::spans;
use crate::types::{LayerResult, ProcessOptions};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, instrument, Instrument, Span};

/// Bounded-concurrency layer decomposition
#[derive(Clone)]
pub struct LayerProcessor {
    pipeline: Arc<SegmentationPipeline>,
    slots: SlotPool,
    reporter: Arc<dyn ProgressReporter>,
}

impl std::fmt::Debug for LayerProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerProcessor")
            .field("pipeline", &self.pipeline)
            .field("slots", &self.slots)
            .finish_non_exhaustive()
    }
}

impl LayerProcessor {
    /// Processor running the built-in GrabCut solver
    ///
    /// # Errors
    /// - Invalid configuration values
    pub fn new(config: &GrabCutConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_pipeline(config, SegmentationPipeline::new(config)))
    }

    /// Processor running a caller-supplied solver
    pub fn with_solver(
        config: &GrabCutConfig,
        solver: Arc<dyn SegmentationSolver>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_pipeline(
            config,
            SegmentationPipeline::with_solver(config, solver),
        ))
    }

    /// Processor around a fully configured pipeline
    pub fn with_pipeline(config: &GrabCutConfig, pipeline: SegmentationPipeline) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_pipeline(config, pipeline))
    }

    fn from_pipeline(config: &GrabCutConfig, pipeline: SegmentationPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            slots: SlotPool::new(config.max_concurrent, config.queue_timeout),
            reporter: Arc::new(NoOpProgressReporter),
        }
    }

    #[must_use]
    pub fn with_progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    #[must_use]
    pub fn slots(&self) -> &SlotPool {
        &self.slots
    }

    /// Decompose an encoded image into foreground and background layers
    ///
    /// # Errors
    /// - `QueueFull` when no slot frees up within the queue timeout
    /// - `Processing` for undecodable input or a failed run
    pub async fn process_bytes(
        &self,
        bytes: Vec<u8>,
        fingerprint: &str,
        options: ProcessOptions,
    ) -> Result<LayerResult> {
        self.process_detailed(bytes, fingerprint, options)
            .await
            .map(|outcome| outcome.result)
    }

    /// Read `path` and decompose it
    ///
    /// The fingerprint is computed from the file contents when not given.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn process_path<P: AsRef<Path>>(
        &self,
        path: P,
        fingerprint: Option<&str>,
        options: ProcessOptions,
    ) -> Result<LayerResult> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| LayerKitError::file_io_error("read image file", path, &e))?;
        let fingerprint = match fingerprint {
            Some(fp) => fp.to_string(),
            None => ImageIOService::fingerprint(&bytes),
        };
        self.process_bytes(bytes, &fingerprint, options).await
    }

    /// Like [`LayerProcessor::process_bytes`] but also returns the processing report
    pub async fn process_detailed(
        &self,
        bytes: Vec<u8>,
        fingerprint: &str,
        options: ProcessOptions,
    ) -> Result<LayerOutcome> {
        let span = spans::layer_request(fingerprint, options.foreground_only);
        self.run(bytes, fingerprint.to_string(), options)
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        bytes: Vec<u8>,
        fingerprint: String,
        options: ProcessOptions,
    ) -> Result<LayerOutcome> {
        let mut tracker = StageTracker::new(Arc::clone(&self.reporter));
        tracker.enter(ProcessingStage::AcquireSlot);
        let slot = match self.slots.acquire().await {
            Ok(slot) => slot,
            Err(e) => {
                tracker.fail(&e.to_string());
                return Err(e);
            },
        };

        let pipeline = Arc::clone(&self.pipeline);
        let span = Span::current();
        let task = tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            let outcome = pipeline.process_bytes(&bytes, &fingerprint, options, &mut tracker);
            if let Err(e) = &outcome {
                tracker.fail(&e.to_string());
            }

            drop(slot);
            tracker.enter(ProcessingStage::ReleaseSlot);
            outcome.map(|mut outcome| {
                outcome.report.stages = tracker.stages().to_vec();
                outcome
            })
        });

        match task.await {
            Ok(outcome) => outcome,
            Err(join_error) => {
                error!(error = %join_error, "Processing task aborted");
                Err(LayerKitError::processing(format!(
                    "Processing task aborted: {join_error}"
                )))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::Trimap;
    use crate::segmentation::{ColorModels, SolverInit};
    use image::{ImageFormat, RgbImage};
    use std::io::Cursor;
    use std::time::Duration;

    struct PanickingSolver;

    impl SegmentationSolver for PanickingSolver {
        fn name(&self) -> &'static str {
            "panicking"
        }

        fn run(
            &self,
            _image: &RgbImage,
            _trimap: &mut Trimap,
            _models: &mut ColorModels,
            _init: SolverInit,
            _iterations: u32,
        ) -> Result<()> {
            panic!("solver exploded");
        }
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let image = RgbImage::from_fn(width, height, |x, y| {
            if (10..30).contains(&x) && (10..30).contains(&y) {
                image::Rgb([0, 0, 0])
            } else {
                image::Rgb([255, 255, 255])
            }
        });
        let mut out = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        out
    }

    fn config(max_concurrent: usize) -> GrabCutConfig {
        GrabCutConfig::builder()
            .max_concurrent(max_concurrent)
            .queue_timeout(Duration::from_millis(200))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_detailed_run_records_slot_stages() {
        let processor = LayerProcessor::new(&config(2)).unwrap();
        let outcome = processor
            .process_detailed(png(40, 40), "fp", ProcessOptions::default())
            .await
            .unwrap();

        let stages = &outcome.report.stages;
        assert_eq!(stages.first(), Some(&ProcessingStage::AcquireSlot));
        assert_eq!(stages.get(1), Some(&ProcessingStage::Load));
        assert_eq!(stages.last(), Some(&ProcessingStage::ReleaseSlot));
        assert_eq!(processor.slots().available(), 2);
    }

    #[tokio::test]
    async fn test_undecodable_input_releases_slot() {
        let processor = LayerProcessor::new(&config(1)).unwrap();
        let err = processor
            .process_bytes(b"nope".to_vec(), "fp", ProcessOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, LayerKitError::Processing(_)));
        assert!(!err.is_queue_full());
        assert_eq!(processor.slots().available(), 1);
    }

    #[tokio::test]
    async fn test_panic_is_processing_error_and_releases_slot() {
        let processor = LayerProcessor::with_solver(&config(1), Arc::new(PanickingSolver)).unwrap();
        let err = processor
            .process_bytes(png(40, 40), "fp", ProcessOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, LayerKitError::Processing(_)));
        assert_eq!(processor.slots().available(), 1);

        // The pool is still usable afterwards
        let again = processor
            .process_bytes(png(40, 40), "fp", ProcessOptions::default())
            .await;
        assert!(matches!(again, Err(LayerKitError::Processing(_))));
    }

    #[tokio::test]
    async fn test_process_path_fingerprints_contents() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("square.png");
        let bytes = png(40, 40);
        std::fs::write(&path, &bytes).unwrap();

        let processor = LayerProcessor::new(&config(1)).unwrap();
        let result = processor
            .process_path(&path, None, ProcessOptions::default())
            .await
            .unwrap();
        assert_eq!(result.content_hash, ImageIOService::fingerprint(&bytes));
        assert_eq!((result.width, result.height), (40, 40));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = GrabCutConfig::default();
        config.iterations = 0;
        assert!(LayerProcessor::new(&config).is_err());
    }
}
