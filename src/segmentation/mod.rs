//! Binary foreground/background segmentation solvers
//!
//! The pipeline talks to the solver only through [`SegmentationSolver`], so a
//! different energy minimiser (or a test double) can be injected without
//! touching the driver.

pub mod gmm;
pub mod grabcut;
pub mod graph;

use crate::error::Result;
use crate::mask::Trimap;
use crate::types::Rect;
use image::RgbImage;

pub use gmm::GaussianMixture;
pub use grabcut::GrabCutSolver;

/// How the solver seeds its colour models
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverInit {
    /// Overwrite the trimap: definite background outside the rectangle,
    /// probable foreground inside, then fit fresh models
    Rect(Rect),
    /// Fit fresh models from the trimap as given
    Mask,
    /// Keep refining with the models from a previous run
    Continue,
}

/// Learned per-class colour models, carried between solver runs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColorModels {
    pub background: GaussianMixture,
    pub foreground: GaussianMixture,
}

impl ColorModels {
    #[must_use]
    pub fn is_trained(&self) -> bool {
        self.background.is_trained() && self.foreground.is_trained()
    }
}

/// Iterative foreground/background energy minimiser
pub trait SegmentationSolver: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &'static str;

    /// Refine `trimap` in place for `iterations` rounds
    ///
    /// Only probable labels are rewritten. A trimap that offers no sample of
    /// one of the two classes is left unchanged.
    ///
    /// # Errors
    /// - Trimap and image dimensions differ
    fn run(
        &self,
        image: &RgbImage,
        trimap: &mut Trimap,
        models: &mut ColorModels,
        init: SolverInit,
        iterations: u32,
    ) -> Result<()>;
}
