//! Chooses how to initialise the solver and how hard to drive it

use crate::analysis::SaliencyEstimator;
use crate::error::Result;
use crate::mask::{Trimap, TrimapLabel};
use crate::segmentation::{ColorModels, SegmentationSolver, SolverInit};
use crate::types::{ComplexityInfo, ComplexityLevel, Rect};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Borders below this are replaced by 5% of the image width
const MIN_BORDER: u32 = 10;
const AUTO_BORDER_FRACTION: f64 = 0.05;
/// Iteration floor for simple scenes
const MIN_SIMPLE_ITERATIONS: u32 = 3;
/// Iterations of the continuation pass after trimap initialisation
const REFINEMENT_ITERATIONS: u32 = 2;

/// How the solver was seeded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitMode {
    /// Fixed inset rectangle (simple scenes)
    Rect,
    /// Saliency trimap
    SaliencyMask,
    /// Saliency rectangle, used when the trimap had no foreground seed
    SaliencyRect,
}

/// Trimap produced by a driver run plus how it got there
#[derive(Debug, Clone)]
pub struct Segmentation {
    pub trimap: Trimap,
    pub init_mode: InitMode,
    /// Iterations of the initial solver pass (excluding refinement)
    pub iterations: u32,
    /// Whether the continuation pass ran
    pub refined: bool,
}

/// Runs the solver with a complexity-dependent strategy
#[derive(Clone)]
pub struct SegmentationDriver {
    solver: Arc<dyn SegmentationSolver>,
    saliency: SaliencyEstimator,
    iterations: u32,
    border_size: u32,
}

impl std::fmt::Debug for SegmentationDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentationDriver")
            .field("solver", &self.solver.name())
            .field("iterations", &self.iterations)
            .field("border_size", &self.border_size)
            .finish()
    }
}

impl SegmentationDriver {
    #[must_use]
    pub fn new(solver: Arc<dyn SegmentationSolver>, iterations: u32, border_size: u32) -> Self {
        Self {
            solver,
            saliency: SaliencyEstimator::new(),
            iterations,
            border_size,
        }
    }

    /// Iterations of the initial pass for a complexity level
    #[must_use]
    pub fn iterations_for(&self, level: ComplexityLevel) -> u32 {
        match level {
            ComplexityLevel::Simple => self.iterations.saturating_sub(2).max(MIN_SIMPLE_ITERATIONS),
            ComplexityLevel::Medium => self.iterations,
            ComplexityLevel::Portrait => self.iterations + 1,
            ComplexityLevel::Complex => self.iterations + 2,
        }
    }

    /// Inset rectangle used for simple scenes
    #[must_use]
    pub fn simple_rect(&self, width: u32, height: u32) -> Rect {
        let border = if self.border_size < MIN_BORDER {
            (f64::from(width) * AUTO_BORDER_FRACTION) as u32
        } else {
            self.border_size
        };
        let border = border.min(width / 2).min(height / 2);
        Rect::new(
            border,
            border,
            width - 2 * border,
            height - 2 * border,
        )
    }

    /// Segment `image` into a trimap whose foreground labels mark the subject
    pub fn segment(&self, image: &RgbImage, complexity: &ComplexityInfo) -> Result<Segmentation> {
        let (width, height) = image.dimensions();
        let iterations = self.iterations_for(complexity.level);
        let mut models = ColorModels::default();

        if complexity.level == ComplexityLevel::Simple {
            let rect = self.simple_rect(width, height);
            debug!(?rect, iterations, "Rectangle initialisation");
            let mut trimap = Trimap::filled(width, height, TrimapLabel::Background);
            self.solver
                .run(image, &mut trimap, &mut models, SolverInit::Rect(rect), iterations)?;
            return Ok(Segmentation {
                trimap,
                init_mode: InitMode::Rect,
                iterations,
                refined: false,
            });
        }

        let saliency = self.saliency.detect(image);
        let mut trimap = self.saliency.create_mask(&saliency);
        let init_mode = if trimap.has_foreground() {
            debug!(iterations, "Saliency trimap initialisation");
            self.solver
                .run(image, &mut trimap, &mut models, SolverInit::Mask, iterations)?;
            InitMode::SaliencyMask
        } else {
            let rect = self.saliency.extract_rect(&saliency);
            info!(?rect, "Saliency trimap has no foreground seed, using saliency rectangle");
            self.solver
                .run(image, &mut trimap, &mut models, SolverInit::Rect(rect), iterations)?;
            InitMode::SaliencyRect
        };

        self.solver.run(
            image,
            &mut trimap,
            &mut models,
            SolverInit::Continue,
            REFINEMENT_ITERATIONS,
        )?;

        Ok(Segmentation {
            trimap,
            init_mode,
            iterations,
            refined: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records every call and labels the init rectangle as probable foreground
    #[derive(Default)]
    struct RecordingSolver {
        calls: Mutex<Vec<(String, u32)>>,
    }

    impl SegmentationSolver for RecordingSolver {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn run(
            &self,
            image: &RgbImage,
            trimap: &mut Trimap,
            _models: &mut ColorModels,
            init: SolverInit,
            iterations: u32,
        ) -> Result<()> {
            if let SolverInit::Rect(rect) = init {
                *trimap = Trimap::from_rect(image.width(), image.height(), rect);
            }
            let tag = match init {
                SolverInit::Rect(_) => "rect",
                SolverInit::Mask => "mask",
                SolverInit::Continue => "continue",
            };
            self.calls
                .lock()
                .map_err(|_| crate::error::LayerKitError::internal("poisoned"))?
                .push((tag.to_string(), iterations));
            Ok(())
        }
    }

    fn info(level: ComplexityLevel) -> ComplexityInfo {
        ComplexityInfo {
            level,
            edge_density: 0.0,
            color_variance: 0.0,
            is_portrait: level == ComplexityLevel::Portrait,
        }
    }

    #[test]
    fn test_iteration_budget() {
        let driver = SegmentationDriver::new(Arc::new(RecordingSolver::default()), 5, 10);
        assert_eq!(driver.iterations_for(ComplexityLevel::Simple), 3);
        assert_eq!(driver.iterations_for(ComplexityLevel::Medium), 5);
        assert_eq!(driver.iterations_for(ComplexityLevel::Portrait), 6);
        assert_eq!(driver.iterations_for(ComplexityLevel::Complex), 7);

        let driver = SegmentationDriver::new(Arc::new(RecordingSolver::default()), 10, 10);
        assert_eq!(driver.iterations_for(ComplexityLevel::Simple), 8);
    }

    #[test]
    fn test_simple_rect_border() {
        let solver = Arc::new(RecordingSolver::default());
        let driver = SegmentationDriver::new(solver.clone(), 5, 10);
        assert_eq!(driver.simple_rect(400, 300), Rect::new(10, 10, 380, 280));

        let driver = SegmentationDriver::new(solver, 5, 4);
        assert_eq!(driver.simple_rect(400, 300), Rect::new(20, 20, 360, 260));
    }

    #[test]
    fn test_simple_scene_runs_once() {
        let solver = Arc::new(RecordingSolver::default());
        let driver = SegmentationDriver::new(solver.clone(), 5, 10);
        let image = RgbImage::new(64, 64);

        let outcome = driver.segment(&image, &info(ComplexityLevel::Simple)).unwrap();
        assert_eq!(outcome.init_mode, InitMode::Rect);
        assert!(!outcome.refined);
        assert_eq!(*solver.calls.lock().unwrap(), vec![("rect".to_string(), 3)]);
    }

    #[test]
    fn test_featureless_scene_falls_back_to_saliency_rect() {
        let solver = Arc::new(RecordingSolver::default());
        let driver = SegmentationDriver::new(solver.clone(), 5, 10);
        let image = RgbImage::from_pixel(100, 100, image::Rgb([90, 90, 90]));

        let outcome = driver.segment(&image, &info(ComplexityLevel::Complex)).unwrap();
        assert_eq!(outcome.init_mode, InitMode::SaliencyRect);
        assert!(outcome.refined);
        assert_eq!(
            *solver.calls.lock().unwrap(),
            vec![("rect".to_string(), 7), ("continue".to_string(), 2)]
        );
        assert_eq!(outcome.trimap.get(50, 50), TrimapLabel::ProbableForeground);
    }

    #[test]
    fn test_textured_scene_uses_trimap() {
        let solver = Arc::new(RecordingSolver::default());
        let driver = SegmentationDriver::new(solver.clone(), 5, 10);
        let image = RgbImage::from_fn(100, 100, |x, y| {
            if (30..70).contains(&x) && (30..70).contains(&y) {
                image::Rgb([250, 250, 250])
            } else {
                image::Rgb([10, 10, 10])
            }
        });

        let outcome = driver.segment(&image, &info(ComplexityLevel::Portrait)).unwrap();
        assert_eq!(outcome.init_mode, InitMode::SaliencyMask);
        assert_eq!(
            *solver.calls.lock().unwrap(),
            vec![("mask".to_string(), 6), ("continue".to_string(), 2)]
        );
    }
}
