//! Core types for layer decomposition

use serde::{Deserialize, Serialize};
use std::fmt;

/// Visual complexity class of an image, which selects the segmentation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityLevel {
    /// Low edge density and low color spread (typically a plain backdrop)
    Simple,
    /// Neither simple nor complex
    Medium,
    /// Dense edges or widely spread colors
    Complex,
    /// Enough skin-colored area to treat the image as a person shot
    Portrait,
}

impl fmt::Display for ComplexityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simple => write!(f, "simple"),
            Self::Medium => write!(f, "medium"),
            Self::Complex => write!(f, "complex"),
            Self::Portrait => write!(f, "portrait"),
        }
    }
}

/// Complexity measurements taken on the working image
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComplexityInfo {
    pub level: ComplexityLevel,
    /// Fraction of edge pixels, in `[0, 1]`
    pub edge_density: f64,
    /// Mean of the per-channel Lab standard deviations
    pub color_variance: f64,
    /// Always equal to `level == ComplexityLevel::Portrait`
    pub is_portrait: bool,
}

/// Axis-aligned rectangle in working-image pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    #[must_use]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The whole `width`x`height` frame
    #[must_use]
    pub const fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Exclusive right edge
    #[must_use]
    pub const fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge
    #[must_use]
    pub const fn bottom(&self) -> u32 {
        self.y + self.height
    }

    #[must_use]
    pub const fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && y >= self.y && x < self.right() && y < self.bottom()
    }

    /// Intersection with the `width`x`height` frame
    #[must_use]
    pub fn clamp_to(&self, width: u32, height: u32) -> Self {
        let x = self.x.min(width);
        let y = self.y.min(height);
        let right = self.right().min(width);
        let bottom = self.bottom().min(height);
        Self::new(x, y, right.saturating_sub(x), bottom.saturating_sub(y))
    }

    /// Smallest rectangle covering both; an empty rectangle is the identity
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Self::new(x, y, right - x, bottom - y)
    }
}

/// Layer bounding box in original-image pixels; all zero means "no foreground"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    #[must_use]
    pub const fn zero() -> Self {
        Self {
            x: 0,
            y: 0,
            width: 0,
            height: 0,
        }
    }

    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.x == 0 && self.y == 0 && self.width == 0 && self.height == 0
    }
}

impl From<Rect> for BoundingBox {
    fn from(rect: Rect) -> Self {
        Self {
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerType {
    Foreground,
    Background,
}

/// One output layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub id: u32,
    #[serde(rename = "type")]
    pub layer_type: LayerType,
    pub bounding_box: BoundingBox,
    /// Base64-encoded PNG of the binary mask at original resolution
    pub mask: String,
    pub confidence: f64,
}

/// Two-layer decomposition of one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerResult {
    /// Hex content fingerprint of the source bytes
    pub content_hash: String,
    pub width: u32,
    pub height: u32,
    /// Foreground (id 1) followed by background (id 2)
    pub layers: Vec<Layer>,
    /// Unix timestamp (seconds) of creation
    pub timestamp: i64,
}

impl LayerResult {
    #[must_use]
    pub fn foreground(&self) -> Option<&Layer> {
        self.layers
            .iter()
            .find(|layer| layer.layer_type == LayerType::Foreground)
    }

    #[must_use]
    pub fn background(&self) -> Option<&Layer> {
        self.layers
            .iter()
            .find(|layer| layer.layer_type == LayerType::Background)
    }
}

/// Processing variants that change the result (and therefore its cache key)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessOptions {
    /// Keep only the largest foreground component
    pub foreground_only: bool,
}

impl ProcessOptions {
    #[must_use]
    pub fn foreground_only() -> Self {
        Self {
            foreground_only: true,
        }
    }
}
