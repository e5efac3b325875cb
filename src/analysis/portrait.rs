//! Skin-tone detection and portrait mask enhancement

use crate::error::Result;
use crate::mask::BinaryMask;
use crate::primitives::{color, morphology, StructuringElement};
use crate::types::Rect;
use image::{GrayImage, RgbImage};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Inclusive Cr range accepted as skin
const SKIN_CR: (u8, u8) = (133, 173);
/// Inclusive Cb range accepted as skin
const SKIN_CB: (u8, u8) = (77, 127);

/// Skin fraction above which an image counts as a portrait
pub const PORTRAIT_SKIN_RATIO: f64 = 0.15;

const SKIN_CLEANUP_KERNEL: u32 = 5;
const ENHANCE_KERNEL: u32 = 15;

/// Pluggable frontal-face detector
///
/// Face rectangles are informational; the pipeline never depends on them.
pub trait FaceDetector: Send + Sync {
    /// Face rectangles found in a grayscale image
    fn detect(&self, gray: &GrayImage) -> Result<Vec<Rect>>;
}

/// Finds skin-colored regions and grows foreground masks around them
#[derive(Clone, Default)]
pub struct PortraitDetector {
    face_detector: Option<Arc<dyn FaceDetector>>,
}

impl fmt::Debug for PortraitDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortraitDetector")
            .field("face_detector", &self.face_detector.is_some())
            .finish()
    }
}

impl PortraitDetector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_face_detector(detector: Arc<dyn FaceDetector>) -> Self {
        Self {
            face_detector: Some(detector),
        }
    }

    /// Skin mask: YCrCb range test, then a 5×5 elliptical close and open
    #[must_use]
    pub fn detect_skin(&self, image: &RgbImage) -> BinaryMask {
        let ycrcb = color::to_ycrcb(image);
        let raw = GrayImage::from_fn(image.width(), image.height(), |x, y| {
            let [_, cr, cb] = ycrcb.get_pixel(x, y).0;
            let skin =
                (SKIN_CR.0..=SKIN_CR.1).contains(&cr) && (SKIN_CB.0..=SKIN_CB.1).contains(&cb);
            image::Luma([if skin { BinaryMask::ON } else { BinaryMask::OFF }])
        });

        let kernel = StructuringElement::ellipse(SKIN_CLEANUP_KERNEL, SKIN_CLEANUP_KERNEL);
        let closed = morphology::close(&raw, &kernel);
        BinaryMask::from_nonzero(&morphology::open(&closed, &kernel))
    }

    /// Fraction of the image covered by the cleaned skin mask
    #[must_use]
    pub fn skin_ratio(&self, image: &RgbImage) -> f64 {
        let total = u64::from(image.width()) * u64::from(image.height());
        if total == 0 {
            return 0.0;
        }
        self.detect_skin(image).count_foreground() as f64 / total as f64
    }

    #[must_use]
    pub fn is_portrait(&self, image: &RgbImage) -> bool {
        self.skin_ratio(image) > PORTRAIT_SKIN_RATIO
    }

    /// Face rectangles from the configured detector
    ///
    /// Returns an empty list when no detector is configured or it fails.
    #[must_use]
    pub fn detect_faces(&self, image: &RgbImage) -> Vec<Rect> {
        let Some(detector) = &self.face_detector else {
            debug!("No face detector configured");
            return Vec::new();
        };
        match detector.detect(&color::to_gray(image)) {
            Ok(faces) => faces,
            Err(e) => {
                warn!(error = %e, "Face detection failed, continuing without faces");
                Vec::new()
            },
        }
    }

    /// Union of `mask` with the skin mask dilated by a 15×15 ellipse
    ///
    /// The result is always a superset of `mask`.
    #[must_use]
    pub fn enhance_portrait_mask(&self, image: &RgbImage, mask: &BinaryMask) -> BinaryMask {
        let skin = self.detect_skin(image);
        let grown = morphology::dilate(
            skin.as_gray(),
            &StructuringElement::ellipse(ENHANCE_KERNEL, ENHANCE_KERNEL),
        );
        mask.union(&BinaryMask::from_nonzero(&grown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LayerKitError;
    use image::Rgb;

    const SKIN: [u8; 3] = [224, 172, 150];

    struct FixedFaces(Vec<Rect>);

    impl FaceDetector for FixedFaces {
        fn detect(&self, _gray: &GrayImage) -> Result<Vec<Rect>> {
            Ok(self.0.clone())
        }
    }

    struct BrokenDetector;

    impl FaceDetector for BrokenDetector {
        fn detect(&self, _gray: &GrayImage) -> Result<Vec<Rect>> {
            Err(LayerKitError::internal("cascade not loaded"))
        }
    }

    fn skin_patch() -> RgbImage {
        RgbImage::from_fn(80, 80, |x, y| {
            if (20..60).contains(&x) && (20..60).contains(&y) {
                Rgb(SKIN)
            } else {
                Rgb([20, 90, 200])
            }
        })
    }

    #[test]
    fn test_skin_detection_finds_patch() {
        let detector = PortraitDetector::new();
        let skin = detector.detect_skin(&skin_patch());

        assert!(skin.get(40, 40));
        assert!(!skin.get(5, 5));
        let ratio = detector.skin_ratio(&skin_patch());
        assert!((ratio - 0.25).abs() < 0.02, "ratio was {ratio}");
        assert!(detector.is_portrait(&skin_patch()));
    }

    #[test]
    fn test_enhance_is_superset() {
        let image = skin_patch();
        let mut mask = BinaryMask::new(80, 80);
        for x in 0..10 {
            mask.set(x, 70, true);
        }
        let enhanced = PortraitDetector::new().enhance_portrait_mask(&image, &mask);

        for x in 0..10 {
            assert!(enhanced.get(x, 70));
        }
        // Skin patch grows by the 15×15 ellipse radius
        assert!(enhanced.get(40, 40));
        assert!(enhanced.get(14, 40));
        assert!(!enhanced.get(2, 2));
    }

    #[test]
    fn test_faces_without_detector_are_empty() {
        assert!(PortraitDetector::new().detect_faces(&skin_patch()).is_empty());
    }

    #[test]
    fn test_faces_from_detector() {
        let faces = vec![Rect::new(20, 20, 40, 40)];
        let detector = PortraitDetector::with_face_detector(Arc::new(FixedFaces(faces.clone())));
        assert_eq!(detector.detect_faces(&skin_patch()), faces);
    }

    #[test]
    fn test_failing_detector_degrades_to_empty() {
        let detector = PortraitDetector::with_face_detector(Arc::new(BrokenDetector));
        assert!(detector.detect_faces(&skin_patch()).is_empty());
    }
}
