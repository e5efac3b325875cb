//! Post-processing of segmentation masks

use crate::mask::{BinaryMask, Trimap};
use crate::primitives::{color, filter, morphology, Components, StructuringElement};
use image::{GrayImage, RgbImage};
use tracing::debug;

const REFINE_KERNEL: u32 = 2;
const REFINE_BLUR: u32 = 3;
const REFINE_THRESHOLD: u8 = 127;

const DETAIL_CANNY_LOW: f32 = 30.0;
const DETAIL_CANNY_HIGH: f32 = 90.0;
const DETAIL_BAND_KERNEL: u32 = 3;
/// Half-width of the neighbourhood vote window (5×5)
const DETAIL_WINDOW_RADIUS: i64 = 2;
/// Foreground neighbours required to confirm an edge-band pixel
const DETAIL_MIN_VOTES: u32 = 12;

/// Stateless mask operations used after segmentation
#[derive(Debug, Clone, Copy, Default)]
pub struct MaskProcessor;

impl MaskProcessor {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Definite and probable foreground become 255, everything else 0
    #[must_use]
    pub fn extract_foreground(&self, trimap: &Trimap) -> BinaryMask {
        let labels = trimap.as_slice();
        let width = trimap.width() as usize;
        BinaryMask::from_fn(trimap.width(), trimap.height(), |x, y| {
            labels[y as usize * width + x as usize].is_foreground()
        })
    }

    /// Opening then closing with a `kernel`×`kernel` ellipse
    #[must_use]
    pub fn morphology_optimize(&self, mask: &BinaryMask, kernel: u32) -> BinaryMask {
        let element = StructuringElement::ellipse(kernel, kernel);
        let opened = morphology::open(mask.as_gray(), &element);
        BinaryMask::from_nonzero(&morphology::close(&opened, &element))
    }

    /// Slight dilation followed by blur and re-threshold to smooth the outline
    #[must_use]
    pub fn refine_edges(&self, mask: &BinaryMask) -> BinaryMask {
        let dilated = morphology::dilate(
            mask.as_gray(),
            &StructuringElement::ellipse(REFINE_KERNEL, REFINE_KERNEL),
        );
        let blurred = filter::gaussian_blur(&dilated, REFINE_BLUR);
        BinaryMask::from_threshold(&blurred, REFINE_THRESHOLD)
    }

    /// Only the largest connected region, with its holes filled
    ///
    /// A mask without foreground is returned unchanged.
    #[must_use]
    pub fn keep_largest(&self, mask: &BinaryMask) -> BinaryMask {
        let components = Components::label(mask.as_gray());
        match components.largest() {
            Some(largest) => {
                debug!(
                    components = components.stats().len(),
                    area = largest.area,
                    "Keeping largest foreground region"
                );
                BinaryMask::from_nonzero(&components.fill_solid(largest.label))
            },
            None => mask.clone(),
        }
    }

    /// Edge-guided consensus pass over a portrait mask
    ///
    /// Pixels inside a thin band around Canny(30/90) edges whose 5×5
    /// neighbourhood has more than 12 foreground pixels are confirmed with
    /// their current value; every other pixel is left as it is. The output
    /// therefore always equals `mask`.
    #[must_use]
    pub fn detail_preserving_refine(&self, mask: &BinaryMask, image: &RgbImage) -> BinaryMask {
        let edges = filter::canny(&color::to_gray(image), DETAIL_CANNY_LOW, DETAIL_CANNY_HIGH);
        let band = morphology::dilate(
            &edges,
            &StructuringElement::rect(DETAIL_BAND_KERNEL, DETAIL_BAND_KERNEL),
        );

        let mut refined = mask.clone();
        let mut confirmed = 0usize;
        for (x, y, p) in band.enumerate_pixels() {
            if p[0] > 0 && neighbourhood_votes(mask.as_gray(), x, y) > DETAIL_MIN_VOTES {
                refined.set(x, y, mask.get(x, y));
                confirmed += 1;
            }
        }
        debug!(confirmed, "Detail-preserving refinement");
        refined
    }
}

fn neighbourhood_votes(mask: &GrayImage, x: u32, y: u32) -> u32 {
    let (width, height) = (i64::from(mask.width()), i64::from(mask.height()));
    let mut votes = 0;
    for dy in -DETAIL_WINDOW_RADIUS..=DETAIL_WINDOW_RADIUS {
        for dx in -DETAIL_WINDOW_RADIUS..=DETAIL_WINDOW_RADIUS {
            let (nx, ny) = (i64::from(x) + dx, i64::from(y) + dy);
            let inside = nx >= 0 && ny >= 0 && nx < width && ny < height;
            if inside && mask.get_pixel(nx as u32, ny as u32)[0] > 128 {
                votes += 1;
            }
        }
    }
    votes
}
