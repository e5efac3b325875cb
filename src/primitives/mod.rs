//! Image-processing primitives used by the analysis and segmentation stages
//!
//! Decoding, resizing and most filters come from `image` and `imageproc`;
//! this module wraps them with the exact conventions the pipeline relies on
//! and supplies the pieces those crates lack (Lab/YCrCb conversion,
//! elliptical morphology, component statistics with hole filling).

pub mod color;
pub mod components;
pub mod filter;
pub mod morphology;

use image::imageops::{self, FilterType};
use image::{GrayImage, RgbImage};

pub use components::{ComponentStats, Components};
pub use morphology::{ElementShape, StructuringElement};

/// Resize a color image; downscaling averages the covered source area
#[must_use]
pub fn resize_rgb(image: &RgbImage, width: u32, height: u32) -> RgbImage {
    if image.dimensions() == (width, height) {
        return image.clone();
    }
    imageops::resize(image, width.max(1), height.max(1), FilterType::Triangle)
}

/// Resize a single-channel image with linear interpolation
#[must_use]
pub fn resize_gray(image: &GrayImage, width: u32, height: u32) -> GrayImage {
    if image.dimensions() == (width, height) {
        return image.clone();
    }
    imageops::resize(image, width.max(1), height.max(1), FilterType::Triangle)
}
