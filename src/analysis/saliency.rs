//! Gradient-based saliency and trimap seeding
//!
//! Saliency here is a blurred Sobel magnitude binarized with Otsu's method.
//! It is deliberately coarse: it only has to place the subject well enough
//! for the solver to learn its color models.

use crate::mask::{Trimap, TrimapLabel};
use crate::primitives::{color, filter, morphology, Components, StructuringElement};
use crate::types::Rect;
use image::{GrayImage, RgbImage};
use tracing::debug;

const BLUR_KERNEL: u32 = 21;
const RECT_DILATE_KERNEL: u32 = 21;
const MASK_DILATE_KERNEL: u32 = 11;
const SALIENT_THRESHOLD: u8 = 128;

/// Fraction of the salient rectangle's width added on every side
const RECT_PADDING: f64 = 0.05;
/// Inset used when nothing salient was found, as a fraction of the width
const FALLBACK_BORDER: f64 = 0.1;
/// Width of the definite-background frame, as a fraction of the width
const MASK_BORDER: f64 = 0.03;

/// Estimates where the subject is and turns that into solver seeds
#[derive(Debug, Clone, Copy, Default)]
pub struct SaliencyEstimator;

impl SaliencyEstimator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Binary saliency map (0 or 255) of the same size as `image`
    #[must_use]
    pub fn detect(&self, image: &RgbImage) -> GrayImage {
        let gray = color::to_gray(image);
        let magnitude = filter::sobel_magnitude(&gray);
        let blurred = filter::gaussian_blur(&magnitude, BLUR_KERNEL);
        let (level, binary) = filter::otsu_threshold(&blurred);
        debug!(otsu_level = level, "Computed saliency map");
        binary
    }

    /// Bounding rectangle of the largest salient region, padded and clamped
    ///
    /// Falls back to a rectangle inset by 10% of the width when the map has
    /// no salient pixels.
    #[must_use]
    pub fn extract_rect(&self, saliency: &GrayImage) -> Rect {
        let (width, height) = saliency.dimensions();
        let dilated = morphology::dilate(
            saliency,
            &StructuringElement::ellipse(RECT_DILATE_KERNEL, RECT_DILATE_KERNEL),
        );

        let Some(largest) = Components::label(&dilated).largest() else {
            let border = (f64::from(width) * FALLBACK_BORDER) as u32;
            debug!(border, "No salient region, using inset rectangle");
            return inset(width, height, border);
        };

        let bounds = largest.bounds;
        let pad = (f64::from(bounds.width) * RECT_PADDING) as u32;
        let x = bounds.x.saturating_sub(pad);
        let y = bounds.y.saturating_sub(pad);
        let right = (bounds.right() + pad).min(width);
        let bottom = (bounds.bottom() + pad).min(height);
        Rect::new(x, y, right - x, bottom - y)
    }

    /// Initial trimap: probable background everywhere, a definite background
    /// frame 3% of the width thick, then probable foreground wherever the
    /// dilated saliency exceeds the threshold (overriding the frame)
    #[must_use]
    pub fn create_mask(&self, saliency: &GrayImage) -> Trimap {
        let (width, height) = saliency.dimensions();
        let mut trimap = Trimap::filled(width, height, TrimapLabel::ProbableBackground);

        let border = (f64::from(width) * MASK_BORDER) as u32;
        for y in 0..height {
            for x in 0..width {
                let in_frame = x < border
                    || y < border
                    || x >= width.saturating_sub(border)
                    || y >= height.saturating_sub(border);
                if in_frame {
                    trimap.set(x, y, TrimapLabel::Background);
                }
            }
        }

        let dilated = morphology::dilate(
            saliency,
            &StructuringElement::ellipse(MASK_DILATE_KERNEL, MASK_DILATE_KERNEL),
        );
        for (x, y, p) in dilated.enumerate_pixels() {
            if p[0] > SALIENT_THRESHOLD {
                trimap.set(x, y, TrimapLabel::ProbableForeground);
            }
        }
        trimap
    }
}

fn inset(width: u32, height: u32, border: u32) -> Rect {
    Rect::new(
        border,
        border,
        width.saturating_sub(2 * border),
        height.saturating_sub(2 * border),
    )
}
