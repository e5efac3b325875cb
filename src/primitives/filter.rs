//! Edge, gradient, blur and threshold operators on grayscale images

use image::{GrayImage, Luma};
use imageproc::gradients::{horizontal_sobel, vertical_sobel};

/// tan(22.5°), boundary between horizontal and diagonal gradient directions
const TAN_22_5: f32 = 0.414_213_56;
/// tan(67.5°), boundary between diagonal and vertical gradient directions
const TAN_67_5: f32 = 2.414_213_6;

const CANDIDATE: u8 = 1;
const EDGE: u8 = 2;

/// Binary edge map (255 on edges)
///
/// The image is not smoothed first. Gradients are 3×3 Sobel responses
/// combined with the L1 norm `|gx| + |gy|`, and both thresholds apply to that
/// magnitude. Non-maximum suppression uses four quantised directions;
/// hysteresis grows edges from pixels above `high` through 8-connected
/// pixels above `low`.
#[must_use]
pub fn canny(gray: &GrayImage, low: f32, high: f32) -> GrayImage {
    let (low, high) = if low > high { (high, low) } else { (low, high) };
    let (width, height) = gray.dimensions();
    let (w, h) = (width as usize, height as usize);

    let gx = horizontal_sobel(gray);
    let gy = vertical_sobel(gray);
    let (gx, gy) = (gx.as_raw(), gy.as_raw());
    let magnitude: Vec<f32> = gx
        .iter()
        .zip(gy)
        .map(|(&dx, &dy)| f32::from(dx.unsigned_abs()) + f32::from(dy.unsigned_abs()))
        .collect();
    let magnitude_at = |x: i64, y: i64| -> f32 {
        if x < 0 || y < 0 || x >= w as i64 || y >= h as i64 {
            0.0
        } else {
            magnitude[y as usize * w + x as usize]
        }
    };

    let mut state = vec![0u8; w * h];
    let mut stack = Vec::new();
    for y in 0..h {
        for x in 0..w {
            let i = y * w + x;
            let m = magnitude[i];
            if m <= low {
                continue;
            }
            let (dx, dy) = (f32::from(gx[i]), f32::from(gy[i]));
            let (ax, ay) = (dx.abs(), dy.abs());
            let (xi, yi) = (x as i64, y as i64);
            let is_maximum = if ay <= TAN_22_5 * ax {
                m > magnitude_at(xi - 1, yi) && m >= magnitude_at(xi + 1, yi)
            } else if ay > TAN_67_5 * ax {
                m > magnitude_at(xi, yi - 1) && m >= magnitude_at(xi, yi + 1)
            } else {
                let s = if (dx < 0.0) == (dy < 0.0) { 1 } else { -1 };
                m > magnitude_at(xi - s, yi - 1) && m > magnitude_at(xi + s, yi + 1)
            };
            if !is_maximum {
                continue;
            }
            if m > high {
                state[i] = EDGE;
                stack.push(i);
            } else {
                state[i] = CANDIDATE;
            }
        }
    }

    while let Some(i) = stack.pop() {
        let (x, y) = ((i % w) as i64, (i / w) as i64);
        for ny in y - 1..=y + 1 {
            for nx in x - 1..=x + 1 {
                if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                    continue;
                }
                let j = ny as usize * w + nx as usize;
                if state[j] == CANDIDATE {
                    state[j] = EDGE;
                    stack.push(j);
                }
            }
        }
    }

    GrayImage::from_fn(width, height, |x, y| {
        let edge = state[y as usize * w + x as usize] == EDGE;
        Luma([if edge { 255 } else { 0 }])
    })
}

/// Fraction of non-zero pixels in `[0, 1]`
#[must_use]
pub fn nonzero_ratio(gray: &GrayImage) -> f64 {
    let total = gray.as_raw().len();
    if total == 0 {
        return 0.0;
    }
    let nonzero = gray.as_raw().iter().filter(|&&v| v != 0).count();
    nonzero as f64 / total as f64
}

/// Equal-weight blend of the saturated absolute x and y Sobel responses
#[must_use]
pub fn sobel_magnitude(gray: &GrayImage) -> GrayImage {
    let gx = horizontal_sobel(gray);
    let gy = vertical_sobel(gray);
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let ax = saturate_abs(gx.get_pixel(x, y)[0]);
        let ay = saturate_abs(gy.get_pixel(x, y)[0]);
        let blended = (u16::from(ax) + u16::from(ay) + 1) / 2;
        Luma([blended as u8])
    })
}

/// Gaussian smoothing sized like a `ksize`x`ksize` kernel
#[must_use]
pub fn gaussian_blur(gray: &GrayImage, ksize: u32) -> GrayImage {
    imageproc::filter::gaussian_blur_f32(gray, sigma_for_kernel(ksize))
}

/// Standard deviation conventionally paired with an odd kernel size
#[must_use]
pub fn sigma_for_kernel(ksize: u32) -> f32 {
    let k = ksize.max(1) as f32;
    0.3 * ((k - 1.0) * 0.5 - 1.0) + 0.8
}

/// Pixels strictly above `threshold` become 255, the rest 0
#[must_use]
pub fn threshold_binary(gray: &GrayImage, threshold: u8) -> GrayImage {
    let mut out = gray.clone();
    for p in out.pixels_mut() {
        p[0] = if p[0] > threshold { 255 } else { 0 };
    }
    out
}

/// Binary threshold at the Otsu level; returns the level and the binary image
#[must_use]
pub fn otsu_threshold(gray: &GrayImage) -> (u8, GrayImage) {
    let level = imageproc::contrast::otsu_level(gray);
    (level, threshold_binary(gray, level))
}

fn saturate_abs(v: i16) -> u8 {
    v.unsigned_abs().min(255) as u8
}
