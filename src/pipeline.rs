//! Synchronous layer decomposition stage machine
//!
//! [`SegmentationPipeline`] takes a decoded image through every stage from
//! smart resize to layer encoding. It holds no mutable state and is shared
//! between concurrent requests; slot gating lives in
//! [`crate::processor::LayerProcessor`].

use crate::analysis::{ComplexityClassifier, PortraitDetector};
use crate::config::GrabCutConfig;
use crate::driver::{InitMode, SegmentationDriver};
use crate::error::Result;
use crate::mask::BinaryMask;
use crate::mask_processor::MaskProcessor;
use crate::primitives::{self, Components};
use crate::segmentation::{GrabCutSolver, SegmentationSolver};
use crate::services::{
    ImageIOService, MaskEncoder, NoOpProgressReporter, ProcessingStage, ProgressReporter,
    ProgressUpdate,
};
use crate::types::{
    BoundingBox, ComplexityInfo, ComplexityLevel, Layer, LayerResult, LayerType, ProcessOptions,
};
use image::RgbImage;
use instant::Instant;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

const MIN_CONFIDENCE: f64 = 0.05;
const MAX_CONFIDENCE: f64 = 0.95;
const RESCALE_THRESHOLD: u8 = 127;

const FOREGROUND_LAYER_ID: u32 = 1;
const BACKGROUND_LAYER_ID: u32 = 2;

/// What happened during one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingReport {
    /// Visited stages in order
    pub stages: Vec<ProcessingStage>,
    pub complexity: ComplexityInfo,
    /// Working size divided by original size (1.0 when not downscaled)
    pub scale: f64,
    pub working_width: u32,
    pub working_height: u32,
    pub init_mode: InitMode,
    /// Solver iterations of the initial pass
    pub iterations: u32,
    pub elapsed_ms: u64,
}

/// Layer result together with its processing report
#[derive(Debug, Clone)]
pub struct LayerOutcome {
    pub result: LayerResult,
    pub report: ProcessingReport,
}

/// Records visited stages and forwards them to a progress reporter
pub struct StageTracker {
    stages: Vec<ProcessingStage>,
    reporter: Arc<dyn ProgressReporter>,
    start: Instant,
}

impl StageTracker {
    #[must_use]
    pub fn new(reporter: Arc<dyn ProgressReporter>) -> Self {
        Self {
            stages: Vec::new(),
            reporter,
            start: Instant::now(),
        }
    }

    /// Tracker that only records
    #[must_use]
    pub fn silent() -> Self {
        Self::new(Arc::new(NoOpProgressReporter))
    }

    pub fn enter(&mut self, stage: ProcessingStage) {
        debug!(stage = ?stage, "{}", stage.description());
        self.stages.push(stage);
        self.reporter
            .report_progress(ProgressUpdate::new(stage, self.start));
    }

    /// Report a failure in the most recent stage
    pub fn fail(&self, error: &str) {
        if let Some(&stage) = self.stages.last() {
            self.reporter.report_error(stage, error);
        }
    }

    #[must_use]
    pub fn stages(&self) -> &[ProcessingStage] {
        &self.stages
    }

    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

/// Adaptive segmentation from decoded pixels to encoded layers
#[derive(Debug, Clone)]
pub struct SegmentationPipeline {
    classifier: ComplexityClassifier,
    portrait: PortraitDetector,
    driver: SegmentationDriver,
    masks: MaskProcessor,
    max_dimension: u32,
}

impl SegmentationPipeline {
    /// Pipeline driving the built-in GrabCut solver
    #[must_use]
    pub fn new(config: &GrabCutConfig) -> Self {
        Self::with_solver(config, Arc::new(GrabCutSolver::new()))
    }

    #[must_use]
    pub fn with_solver(config: &GrabCutConfig, solver: Arc<dyn SegmentationSolver>) -> Self {
        Self {
            classifier: ComplexityClassifier::new(),
            portrait: PortraitDetector::new(),
            driver: SegmentationDriver::new(solver, config.iterations, config.border_size),
            masks: MaskProcessor::new(),
            max_dimension: config.max_dimension,
        }
    }

    /// Use `portrait` for both classification and mask enhancement
    #[must_use]
    pub fn with_portrait_detector(mut self, portrait: PortraitDetector) -> Self {
        self.classifier = ComplexityClassifier::with_portrait_detector(portrait.clone());
        self.portrait = portrait;
        self
    }

    #[must_use]
    pub fn portrait_detector(&self) -> &PortraitDetector {
        &self.portrait
    }

    /// Decode `bytes` and run the full pipeline
    ///
    /// # Errors
    /// - Undecodable input (`Processing`)
    /// - Solver failures
    pub fn process_bytes(
        &self,
        bytes: &[u8],
        fingerprint: &str,
        options: ProcessOptions,
        tracker: &mut StageTracker,
    ) -> Result<LayerOutcome> {
        tracker.enter(ProcessingStage::Load);
        let image = ImageIOService::decode(bytes)?.to_rgb8();
        self.process_image(&image, fingerprint, options, tracker)
    }

    /// Run the pipeline on an already decoded image, without progress reporting
    pub fn process(
        &self,
        image: &RgbImage,
        fingerprint: &str,
        options: ProcessOptions,
    ) -> Result<LayerOutcome> {
        self.process_image(image, fingerprint, options, &mut StageTracker::silent())
    }

    pub fn process_image(
        &self,
        image: &RgbImage,
        fingerprint: &str,
        options: ProcessOptions,
        tracker: &mut StageTracker,
    ) -> Result<LayerOutcome> {
        let (width, height) = image.dimensions();
        info!(width, height, "Processing image");

        tracker.enter(ProcessingStage::SmartResize);
        let (working, scale) = smart_resize(image, self.max_dimension);
        let (working_width, working_height) = working.dimensions();

        tracker.enter(ProcessingStage::Classify);
        let complexity = self.classifier.classify(&working);
        info!(
            level = %complexity.level,
            is_portrait = complexity.is_portrait,
            scale,
            "Scene analyzed"
        );

        tracker.enter(if complexity.level == ComplexityLevel::Simple {
            ProcessingStage::RectInit
        } else {
            ProcessingStage::SaliencyInit
        });
        tracker.enter(ProcessingStage::Segment);
        let segmentation = self.driver.segment(&working, &complexity)?;
        debug!(
            init_mode = ?segmentation.init_mode,
            iterations = segmentation.iterations,
            refined = segmentation.refined,
            "Segmentation finished"
        );

        tracker.enter(ProcessingStage::ExtractForeground);
        let mut mask = self.masks.extract_foreground(&segmentation.trimap);

        if complexity.is_portrait {
            tracker.enter(ProcessingStage::PortraitEnhance);
            mask = self.portrait.enhance_portrait_mask(&working, &mask);
            tracker.enter(ProcessingStage::DetailRefine);
            mask = self.masks.detail_preserving_refine(&mask, &working);
        }

        tracker.enter(ProcessingStage::MorphologyOptimize);
        mask = self
            .masks
            .morphology_optimize(&mask, morphology_kernel(complexity.level));

        if complexity.level != ComplexityLevel::Simple {
            tracker.enter(ProcessingStage::RefineEdges);
            mask = self.masks.refine_edges(&mask);
        }

        if (working_width, working_height) != (width, height) {
            tracker.enter(ProcessingStage::RescaleToOriginal);
            mask = rescale_mask(&mask, width, height);
        }

        if options.foreground_only {
            tracker.enter(ProcessingStage::KeepLargest);
            mask = self.masks.keep_largest(&mask);
        }

        tracker.enter(ProcessingStage::ComputeBBoxAndConfidence);
        let bounding_box = compute_bounding_box(&mask);
        let confidence = compute_confidence(&mask, width, height);

        tracker.enter(ProcessingStage::EncodeLayers);
        let result = build_result(fingerprint, &mask, bounding_box, confidence)?;

        let report = ProcessingReport {
            stages: tracker.stages().to_vec(),
            complexity,
            scale,
            working_width,
            working_height,
            init_mode: segmentation.init_mode,
            iterations: segmentation.iterations,
            elapsed_ms: tracker.elapsed_ms(),
        };
        info!(
            foreground_confidence = confidence,
            complexity = %complexity.level,
            elapsed_ms = report.elapsed_ms,
            "Image processed successfully"
        );

        Ok(LayerOutcome { result, report })
    }
}

fn morphology_kernel(level: ComplexityLevel) -> u32 {
    match level {
        ComplexityLevel::Complex | ComplexityLevel::Portrait => 5,
        ComplexityLevel::Simple | ComplexityLevel::Medium => 3,
    }
}

fn build_result(
    fingerprint: &str,
    foreground: &BinaryMask,
    bounding_box: BoundingBox,
    confidence: f64,
) -> Result<LayerResult> {
    let (width, height) = foreground.dimensions();
    let background = foreground.inverted();

    Ok(LayerResult {
        content_hash: fingerprint.to_string(),
        width,
        height,
        layers: vec![
            Layer {
                id: FOREGROUND_LAYER_ID,
                layer_type: LayerType::Foreground,
                bounding_box,
                mask: MaskEncoder::to_png_base64(foreground)?,
                confidence,
            },
            Layer {
                id: BACKGROUND_LAYER_ID,
                layer_type: LayerType::Background,
                bounding_box: BoundingBox {
                    x: 0,
                    y: 0,
                    width,
                    height,
                },
                mask: MaskEncoder::to_png_base64(&background)?,
                confidence: 1.0 - confidence,
            },
        ],
        timestamp: chrono::Utc::now().timestamp(),
    })
}

/// Downscale so that the longer side is at most `max_dimension`
///
/// Returns the working image and the applied scale (1.0 when untouched).
/// Target sizes are truncated toward zero.
#[must_use]
pub fn smart_resize(image: &RgbImage, max_dimension: u32) -> (RgbImage, f64) {
    let (width, height) = image.dimensions();
    let longest = width.max(height);
    if longest <= max_dimension {
        return (image.clone(), 1.0);
    }

    let scale = f64::from(max_dimension) / f64::from(longest);
    let new_width = ((f64::from(width) * scale) as u32).max(1);
    let new_height = ((f64::from(height) * scale) as u32).max(1);
    (primitives::resize_rgb(image, new_width, new_height), scale)
}

/// Resize a mask with linear interpolation and re-binarise it at 127
#[must_use]
pub fn rescale_mask(mask: &BinaryMask, width: u32, height: u32) -> BinaryMask {
    let resized = primitives::resize_gray(mask.as_gray(), width, height);
    BinaryMask::from_threshold(&resized, RESCALE_THRESHOLD)
}

/// Union of the bounding rectangles of all foreground regions
///
/// The zero box means the mask has no foreground.
#[must_use]
pub fn compute_bounding_box(mask: &BinaryMask) -> BoundingBox {
    let components = Components::label(mask.as_gray());
    if components.is_empty() {
        return BoundingBox::zero();
    }
    BoundingBox::from(components.union_bounds())
}

/// Foreground share of the image, clamped to `[0.05, 0.95]`
#[must_use]
pub fn compute_confidence(mask: &BinaryMask, width: u32, height: u32) -> f64 {
    let total = f64::from(width) * f64::from(height);
    if total == 0.0 {
        return MIN_CONFIDENCE;
    }
    (mask.count_foreground() as f64 / total).clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
}
