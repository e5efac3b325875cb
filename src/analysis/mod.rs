//! Scene analysis run on the working image before segmentation
//!
//! - [`ComplexityClassifier`] picks the segmentation strategy
//! - [`PortraitDetector`] finds skin regions and optionally faces
//! - [`SaliencyEstimator`] builds the initial trimap for non-simple scenes

pub mod complexity;
pub mod portrait;
pub mod saliency;

pub use complexity::ComplexityClassifier;
pub use portrait::{FaceDetector, PortraitDetector};
pub use saliency::SaliencyEstimator;
