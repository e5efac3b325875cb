//! Binary morphology with rectangular and elliptical elements
//!
//! The operators delegate to `imageproc`'s grayscale morphology on a
//! binarized copy of the input (any non-zero pixel is "on"), so outputs hold
//! only 0 and 255. Pixels outside the image never contribute: dilation sees
//! them as off and erosion ignores them.

use image::{GrayImage, Luma};
use imageproc::morphology::{
    grayscale_close, grayscale_dilate, grayscale_erode, grayscale_open, Mask,
};

/// Largest side `imageproc` accepts for a mask image
const MAX_ELEMENT_SIDE: u32 = 511;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementShape {
    Rect,
    Ellipse,
}

/// Structuring element anchored at its center
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuringElement {
    /// Kernel cells, 255 where the element is set
    footprint: GrayImage,
    mask: Mask,
}

impl StructuringElement {
    /// Build an element of the given shape, anchored at its center
    #[must_use]
    pub fn new(shape: ElementShape, width: u32, height: u32) -> Self {
        let width = width.clamp(1, MAX_ELEMENT_SIDE);
        let height = height.clamp(1, MAX_ELEMENT_SIDE);
        let r = (height / 2) as i32;
        let c = (width / 2) as i32;
        let inv_r2 = if r > 0 { 1.0 / f64::from(r * r) } else { 0.0 };

        let footprint = GrayImage::from_fn(width, height, |col, row| {
            let on = match shape {
                ElementShape::Rect => true,
                ElementShape::Ellipse => {
                    let dy = row as i32 - r;
                    let dx = (f64::from(c) * (f64::from(r * r - dy * dy) * inv_r2).sqrt())
                        .round() as i32;
                    (col as i32 - c).abs() <= dx
                },
            };
            Luma([if on { 255 } else { 0 }])
        });
        // both sides are at most 511, so the center fits in a u8
        let mask = Mask::from_image(&footprint, (width / 2) as u8, (height / 2) as u8);

        Self { footprint, mask }
    }

    #[must_use]
    pub fn rect(width: u32, height: u32) -> Self {
        Self::new(ElementShape::Rect, width, height)
    }

    #[must_use]
    pub fn ellipse(width: u32, height: u32) -> Self {
        Self::new(ElementShape::Ellipse, width, height)
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.footprint.dimensions()
    }

    /// Whether the element covers kernel cell `(col, row)`
    #[must_use]
    pub fn contains(&self, col: u32, row: u32) -> bool {
        self.footprint
            .get_pixel_checked(col, row)
            .is_some_and(|p| p[0] != 0)
    }

    #[must_use]
    pub fn as_mask(&self) -> &Mask {
        &self.mask
    }
}

/// Set pixels that have at least one "on" pixel under the element
#[must_use]
pub fn dilate(image: &GrayImage, element: &StructuringElement) -> GrayImage {
    apply(image, element, grayscale_dilate)
}

/// Keep pixels whose element footprint (inside the image) is entirely "on"
#[must_use]
pub fn erode(image: &GrayImage, element: &StructuringElement) -> GrayImage {
    apply(image, element, grayscale_erode)
}

/// Erosion followed by dilation
#[must_use]
pub fn open(image: &GrayImage, element: &StructuringElement) -> GrayImage {
    apply(image, element, grayscale_open)
}

/// Dilation followed by erosion
#[must_use]
pub fn close(image: &GrayImage, element: &StructuringElement) -> GrayImage {
    apply(image, element, grayscale_close)
}

fn apply(
    image: &GrayImage,
    element: &StructuringElement,
    operator: fn(&GrayImage, &Mask) -> GrayImage,
) -> GrayImage {
    let binary = binarize(image);
    if binary.width() == 0 || binary.height() == 0 {
        return binary;
    }
    operator(&binary, element.as_mask())
}

fn binarize(image: &GrayImage) -> GrayImage {
    let mut binary = image.clone();
    for pixel in binary.pixels_mut() {
        pixel[0] = if pixel[0] != 0 { 255 } else { 0 };
    }
    binary
}
