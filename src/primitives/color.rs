//! Color space conversions on 8-bit RGB images
//!
//! All converted images keep three 8-bit channels so that they can be fed to
//! the same statistics helpers as the source image.

use image::{GrayImage, Rgb, RgbImage};

/// Luma image (weights 0.2126/0.7152/0.0722 as implemented by `image`)
#[must_use]
pub fn to_gray(image: &RgbImage) -> GrayImage {
    image::imageops::grayscale(image)
}

/// 8-bit CIE L*a*b* (D65 white, sRGB transfer curve)
///
/// L is scaled from `[0, 100]` to `[0, 255]`; a and b are offset by 128.
#[must_use]
pub fn to_lab(image: &RgbImage) -> RgbImage {
    let linear = srgb_to_linear_table();
    let mut out = RgbImage::new(image.width(), image.height());
    for (src, dst) in image.pixels().zip(out.pixels_mut()) {
        *dst = Rgb(lab_pixel(&linear, src.0));
    }
    out
}

/// 8-bit Y/Cr/Cb (BT.601), channels stored in that order
#[must_use]
pub fn to_ycrcb(image: &RgbImage) -> RgbImage {
    let mut out = RgbImage::new(image.width(), image.height());
    for (src, dst) in image.pixels().zip(out.pixels_mut()) {
        *dst = Rgb(ycrcb_pixel(src.0));
    }
    out
}

/// Population standard deviation of each channel
#[must_use]
pub fn channel_std_dev(image: &RgbImage) -> [f64; 3] {
    let count = f64::from(image.width()) * f64::from(image.height());
    if count == 0.0 {
        return [0.0; 3];
    }

    let mut sum = [0.0f64; 3];
    let mut sum_sq = [0.0f64; 3];
    for pixel in image.pixels() {
        for c in 0..3 {
            let v = f64::from(pixel[c]);
            sum[c] += v;
            sum_sq[c] += v * v;
        }
    }

    let mut std = [0.0; 3];
    for c in 0..3 {
        let mean = sum[c] / count;
        std[c] = (sum_sq[c] / count - mean * mean).max(0.0).sqrt();
    }
    std
}

pub(crate) fn ycrcb_pixel([r, g, b]: [u8; 3]) -> [u8; 3] {
    let (r, g, b) = (f64::from(r), f64::from(g), f64::from(b));
    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    let cr = (r - y) * 0.713 + 128.0;
    let cb = (b - y) * 0.564 + 128.0;
    [saturate(y), saturate(cr), saturate(cb)]
}

fn lab_pixel(linear: &[f64; 256], [r, g, b]: [u8; 3]) -> [u8; 3] {
    const THRESHOLD: f64 = 0.008_856;

    let (r, g, b) = (
        linear[usize::from(r)],
        linear[usize::from(g)],
        linear[usize::from(b)],
    );

    let x = (0.412_453 * r + 0.357_580 * g + 0.180_423 * b) / 0.950_456;
    let y = 0.212_671 * r + 0.715_160 * g + 0.072_169 * b;
    let z = (0.019_334 * r + 0.119_193 * g + 0.950_227 * b) / 1.088_754;

    let f = |t: f64| {
        if t > THRESHOLD {
            t.cbrt()
        } else {
            7.787 * t + 16.0 / 116.0
        }
    };

    let l = if y > THRESHOLD {
        116.0 * y.cbrt() - 16.0
    } else {
        903.3 * y
    };
    let a = 500.0 * (f(x) - f(y)) + 128.0;
    let b = 200.0 * (f(y) - f(z)) + 128.0;

    [saturate(l * 255.0 / 100.0), saturate(a), saturate(b)]
}

fn srgb_to_linear_table() -> [f64; 256] {
    let mut table = [0.0; 256];
    for (i, entry) in table.iter_mut().enumerate() {
        let c = i as f64 / 255.0;
        *entry = if c <= 0.040_45 {
            c / 12.92
        } else {
            ((c + 0.055) / 1.055).powf(2.4)
        };
    }
    table
}

fn saturate(v: f64) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: u8, expected: u8, tolerance: u8) {
        assert!(
            actual.abs_diff(expected) <= tolerance,
            "expected {expected} +/- {tolerance}, got {actual}"
        );
    }

    #[test]
    fn test_lab_of_achromatic_colors() {
        let linear = srgb_to_linear_table();
        assert_eq!(lab_pixel(&linear, [255, 255, 255]), [255, 128, 128]);
        assert_eq!(lab_pixel(&linear, [0, 0, 0]), [0, 128, 128]);
    }

    #[test]
    fn test_lab_of_primaries() {
        let linear = srgb_to_linear_table();
        // Reference values: red = (53.2, 80.1, 67.2), green = (87.7, -86.2, 83.2)
        let red = lab_pixel(&linear, [255, 0, 0]);
        assert_close(red[0], 136, 1);
        assert_close(red[1], 208, 1);
        assert_close(red[2], 195, 1);

        let green = lab_pixel(&linear, [0, 255, 0]);
        assert_close(green[0], 224, 1);
        assert_close(green[1], 42, 1);
        assert_close(green[2], 211, 1);
    }

    #[test]
    fn test_ycrcb_skin_tone_lands_in_skin_band() {
        let [y, cr, cb] = ycrcb_pixel([224, 172, 150]);
        assert_close(y, 185, 1);
        assert!((133..=173).contains(&cr));
        assert!((77..=127).contains(&cb));

        assert_eq!(ycrcb_pixel([128, 128, 128]), [128, 128, 128]);
    }

    #[test]
    fn test_channel_std_dev() {
        let image = RgbImage::from_fn(4, 1, |x, _| {
            if x % 2 == 0 {
                Rgb([0, 10, 50])
            } else {
                Rgb([200, 10, 150])
            }
        });
        let std = channel_std_dev(&image);
        assert!((std[0] - 100.0).abs() < 1e-9);
        assert!(std[1].abs() < 1e-9);
        assert!((std[2] - 50.0).abs() < 1e-9);
    }
}
