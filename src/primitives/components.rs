//! Connected-component extraction on binary images

use crate::types::Rect;
use image::{GrayImage, ImageBuffer, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};

/// Area and extent of one 8-connected component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentStats {
    /// Label in the label image (1-based)
    pub label: u32,
    /// Pixel count
    pub area: u64,
    pub bounds: Rect,
}

/// Labelled components of a binary image
#[derive(Debug, Clone)]
pub struct Components {
    labels: ImageBuffer<Luma<u32>, Vec<u32>>,
    stats: Vec<ComponentStats>,
}

impl Components {
    /// Label the non-zero pixels of `mask` with 8-connectivity
    #[must_use]
    pub fn label(mask: &GrayImage) -> Self {
        // Normalize so that differing non-zero values still join one component
        let mut binary = mask.clone();
        for p in binary.pixels_mut() {
            if p[0] != 0 {
                p[0] = 255;
            }
        }

        let labels = if binary.as_raw().len() < 2 {
            // imageproc's union-find cannot handle single-pixel images
            ImageBuffer::from_fn(binary.width(), binary.height(), |x, y| {
                Luma([u32::from(binary.get_pixel(x, y)[0] != 0)])
            })
        } else {
            connected_components(&binary, Connectivity::Eight, Luma([0u8]))
        };

        let mut extents: Vec<Option<(u32, u32, u32, u32, u64)>> = Vec::new();
        for (x, y, label) in labels.enumerate_pixels() {
            let label = label[0];
            if label == 0 {
                continue;
            }
            let index = label as usize - 1;
            if extents.len() <= index {
                extents.resize(index + 1, None);
            }
            extents[index] = Some(match extents[index] {
                None => (x, y, x, y, 1),
                Some((min_x, min_y, max_x, max_y, area)) => (
                    min_x.min(x),
                    min_y.min(y),
                    max_x.max(x),
                    max_y.max(y),
                    area + 1,
                ),
            });
        }

        let stats = extents
            .into_iter()
            .enumerate()
            .filter_map(|(index, extent)| {
                extent.map(|(min_x, min_y, max_x, max_y, area)| ComponentStats {
                    label: index as u32 + 1,
                    area,
                    bounds: Rect::new(min_x, min_y, max_x - min_x + 1, max_y - min_y + 1),
                })
            })
            .collect();

        Self { labels, stats }
    }

    #[must_use]
    pub fn stats(&self) -> &[ComponentStats] {
        &self.stats
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    /// Component with the largest area (first one on ties)
    #[must_use]
    pub fn largest(&self) -> Option<ComponentStats> {
        self.stats
            .iter()
            .copied()
            .reduce(|best, c| if c.area > best.area { c } else { best })
    }

    /// Union of all component bounding rectangles (empty when there are none)
    #[must_use]
    pub fn union_bounds(&self) -> Rect {
        self.stats
            .iter()
            .fold(Rect::default(), |acc, c| acc.union(&c.bounds))
    }

    /// Rasterize one component as a solid region: its pixels plus every hole it encloses
    #[must_use]
    pub fn fill_solid(&self, label: u32) -> GrayImage {
        let (width, height) = self.labels.dimensions();
        let w = width as usize;
        let h = height as usize;
        let is_member: Vec<bool> = self.labels.as_raw().iter().map(|&l| l == label).collect();

        // Flood the complement from the frame with 4-connectivity; whatever
        // stays unreached is inside the component's outer boundary.
        let mut outside = vec![false; w * h];
        let mut stack = Vec::new();
        let seed = |x: usize, y: usize, outside: &mut [bool], stack: &mut Vec<usize>| {
            let i = y * w + x;
            if !is_member[i] && !outside[i] {
                outside[i] = true;
                stack.push(i);
            }
        };
        for x in 0..w {
            seed(x, 0, &mut outside, &mut stack);
            if h > 1 {
                seed(x, h - 1, &mut outside, &mut stack);
            }
        }
        for y in 0..h {
            seed(0, y, &mut outside, &mut stack);
            if w > 1 {
                seed(w - 1, y, &mut outside, &mut stack);
            }
        }

        while let Some(i) = stack.pop() {
            let (x, y) = (i % w, i / w);
            if x > 0 {
                seed(x - 1, y, &mut outside, &mut stack);
            }
            if x + 1 < w {
                seed(x + 1, y, &mut outside, &mut stack);
            }
            if y > 0 {
                seed(x, y - 1, &mut outside, &mut stack);
            }
            if y + 1 < h {
                seed(x, y + 1, &mut outside, &mut stack);
            }
        }

        let raw = outside
            .into_iter()
            .map(|o| if o { 0 } else { 255 })
            .collect::<Vec<u8>>();
        GrayImage::from_raw(width, height, raw).unwrap_or_else(|| GrayImage::new(width, height))
    }
}
