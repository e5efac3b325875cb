//! Edge density and color spread based scene classification

use crate::analysis::portrait::PortraitDetector;
use crate::primitives::{color, filter};
use crate::types::{ComplexityInfo, ComplexityLevel};
use image::RgbImage;
use tracing::debug;

const CANNY_LOW: f32 = 50.0;
const CANNY_HIGH: f32 = 150.0;

const SIMPLE_EDGE_DENSITY: f64 = 0.05;
const SIMPLE_COLOR_VARIANCE: f64 = 30.0;
const COMPLEX_EDGE_DENSITY: f64 = 0.15;
const COMPLEX_COLOR_VARIANCE: f64 = 60.0;

/// Classifies an image as simple, medium, complex or portrait
///
/// Portrait detection takes precedence over the edge/color measurements.
#[derive(Debug, Clone, Default)]
pub struct ComplexityClassifier {
    portrait: PortraitDetector,
}

impl ComplexityClassifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific portrait detector for the skin check
    #[must_use]
    pub fn with_portrait_detector(portrait: PortraitDetector) -> Self {
        Self { portrait }
    }

    /// Classify `image`; the result is a pure function of the pixels
    #[must_use]
    pub fn classify(&self, image: &RgbImage) -> ComplexityInfo {
        let edge_density = Self::edge_density(image);
        let color_variance = Self::color_variance(image);
        let is_portrait = self.portrait.is_portrait(image);

        let level = if is_portrait {
            ComplexityLevel::Portrait
        } else if edge_density < SIMPLE_EDGE_DENSITY && color_variance < SIMPLE_COLOR_VARIANCE {
            ComplexityLevel::Simple
        } else if edge_density > COMPLEX_EDGE_DENSITY || color_variance > COMPLEX_COLOR_VARIANCE {
            ComplexityLevel::Complex
        } else {
            ComplexityLevel::Medium
        };

        debug!(
            level = %level,
            edge_density,
            color_variance,
            is_portrait,
            "Classified scene complexity"
        );

        ComplexityInfo {
            level,
            edge_density,
            color_variance,
            is_portrait,
        }
    }

    /// Fraction of Canny edge pixels on the grayscale image
    #[must_use]
    pub fn edge_density(image: &RgbImage) -> f64 {
        let edges = filter::canny(&color::to_gray(image), CANNY_LOW, CANNY_HIGH);
        filter::nonzero_ratio(&edges)
    }

    /// Mean of the per-channel standard deviations in Lab space
    #[must_use]
    pub fn color_variance(image: &RgbImage) -> f64 {
        let std = color::channel_std_dev(&color::to_lab(image));
        (std[0] + std[1] + std[2]) / 3.0
    }
}
