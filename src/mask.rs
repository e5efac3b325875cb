//! Mask representations
//!
//! Two forms circulate through the pipeline and must never be mixed up:
//! the four-level [`Trimap`] consumed and produced by the segmentation solver,
//! and the post-processed [`BinaryMask`] holding only 0 and 255.

use crate::types::Rect;
use image::{GrayImage, Luma};

/// Per-pixel label of a segmentation trimap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TrimapLabel {
    /// Definitely background, never rewritten by the solver
    Background = 0,
    /// Definitely foreground, never rewritten by the solver
    Foreground = 1,
    ProbableBackground = 2,
    ProbableForeground = 3,
}

impl TrimapLabel {
    /// Decode a raw label value
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Background),
            1 => Some(Self::Foreground),
            2 => Some(Self::ProbableBackground),
            3 => Some(Self::ProbableForeground),
            _ => None,
        }
    }

    /// Definite or probable foreground
    #[must_use]
    pub const fn is_foreground(self) -> bool {
        matches!(self, Self::Foreground | Self::ProbableForeground)
    }

    /// Labels the solver is allowed to rewrite
    #[must_use]
    pub const fn is_probable(self) -> bool {
        matches!(self, Self::ProbableBackground | Self::ProbableForeground)
    }
}

/// Four-level segmentation input/output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trimap {
    width: u32,
    height: u32,
    labels: Vec<TrimapLabel>,
}

impl Trimap {
    /// Trimap with every pixel set to `label`
    #[must_use]
    pub fn filled(width: u32, height: u32, label: TrimapLabel) -> Self {
        Self {
            width,
            height,
            labels: vec![label; width as usize * height as usize],
        }
    }

    /// Definite background outside `rect`, probable foreground inside
    #[must_use]
    pub fn from_rect(width: u32, height: u32, rect: Rect) -> Self {
        let rect = rect.clamp_to(width, height);
        let mut trimap = Self::filled(width, height, TrimapLabel::Background);
        for y in rect.y..rect.bottom() {
            for x in rect.x..rect.right() {
                trimap.set(x, y, TrimapLabel::ProbableForeground);
            }
        }
        trimap
    }

    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub const fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> TrimapLabel {
        self.labels[self.index(x, y)]
    }

    pub fn set(&mut self, x: u32, y: u32, label: TrimapLabel) {
        let index = self.index(x, y);
        self.labels[index] = label;
    }

    /// Row-major labels
    #[must_use]
    pub fn as_slice(&self) -> &[TrimapLabel] {
        &self.labels
    }

    pub fn as_mut_slice(&mut self) -> &mut [TrimapLabel] {
        &mut self.labels
    }

    #[must_use]
    pub fn count(&self, label: TrimapLabel) -> usize {
        self.labels.iter().filter(|&&l| l == label).count()
    }

    /// Whether any pixel is definite or probable foreground
    #[must_use]
    pub fn has_foreground(&self) -> bool {
        self.labels.iter().any(|l| l.is_foreground())
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }
}

/// Binary mask holding only 0 (background) and 255 (foreground)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryMask(GrayImage);

impl BinaryMask {
    pub const ON: u8 = 255;
    pub const OFF: u8 = 0;

    /// All-background mask
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self(GrayImage::new(width, height))
    }

    /// Binarize a grayscale image: values strictly above `threshold` become foreground
    #[must_use]
    pub fn from_threshold(gray: &GrayImage, threshold: u8) -> Self {
        Self(GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
            Luma([if gray.get_pixel(x, y)[0] > threshold {
                Self::ON
            } else {
                Self::OFF
            }])
        }))
    }

    /// Treat every non-zero pixel as foreground
    #[must_use]
    pub fn from_nonzero(gray: &GrayImage) -> Self {
        Self::from_threshold(gray, 0)
    }

    /// Build from a per-pixel predicate
    #[must_use]
    pub fn from_fn<F: FnMut(u32, u32) -> bool>(width: u32, height: u32, mut f: F) -> Self {
        Self(GrayImage::from_fn(width, height, |x, y| {
            Luma([if f(x, y) { Self::ON } else { Self::OFF }])
        }))
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.0.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.0.height()
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.0.dimensions()
    }

    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> bool {
        self.0.get_pixel(x, y)[0] != Self::OFF
    }

    pub fn set(&mut self, x: u32, y: u32, on: bool) {
        self.0
            .put_pixel(x, y, Luma([if on { Self::ON } else { Self::OFF }]));
    }

    #[must_use]
    pub fn count_foreground(&self) -> usize {
        self.0.as_raw().iter().filter(|&&v| v != Self::OFF).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.as_raw().iter().all(|&v| v == Self::OFF)
    }

    /// Bitwise NOT
    #[must_use]
    pub fn inverted(&self) -> Self {
        let mut out = self.0.clone();
        for p in out.pixels_mut() {
            p[0] = if p[0] == Self::OFF { Self::ON } else { Self::OFF };
        }
        Self(out)
    }

    /// Per-pixel OR
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self::from_fn(self.width(), self.height(), |x, y| {
            self.get(x, y) || other.get(x, y)
        })
    }

    #[must_use]
    pub fn as_gray(&self) -> &GrayImage {
        &self.0
    }

    #[must_use]
    pub fn into_gray(self) -> GrayImage {
        self.0
    }
}
