//! PNG + base64 transport encoding for layer masks

use crate::error::{LayerKitError, Result};
use crate::mask::BinaryMask;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{ImageFormat, ImageReader};
use std::io::Cursor;

/// Encodes masks for embedding in a [`crate::types::Layer`]
pub struct MaskEncoder;

impl MaskEncoder {
    /// Lossless single-channel PNG of `mask`, base64 encoded
    pub fn to_png_base64(mask: &BinaryMask) -> Result<String> {
        Ok(STANDARD.encode(Self::to_png(mask)?))
    }

    /// Raw PNG bytes of `mask`
    pub fn to_png(mask: &BinaryMask) -> Result<Vec<u8>> {
        let mut png = Vec::new();
        mask.as_gray()
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| {
                LayerKitError::processing_stage_error(
                    "mask encoding",
                    &e.to_string(),
                    Some(&format!("{}x{}", mask.width(), mask.height())),
                )
            })?;
        Ok(png)
    }

    /// Decode a mask produced by [`MaskEncoder::to_png_base64`]
    ///
    /// Any non-zero pixel is read back as foreground.
    pub fn from_png_base64(encoded: &str) -> Result<BinaryMask> {
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| LayerKitError::invalid_input(format!("Mask is not valid base64: {e}")))?;
        let image = ImageReader::with_format(Cursor::new(bytes), ImageFormat::Png).decode()?;
        Ok(BinaryMask::from_nonzero(&image.to_luma8()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_survives_transport() {
        let mask = BinaryMask::from_fn(17, 9, |x, y| (x + y) % 3 == 0);
        let encoded = MaskEncoder::to_png_base64(&mask).unwrap();

        assert!(!encoded.contains('\n'));
        assert_eq!(MaskEncoder::from_png_base64(&encoded).unwrap(), mask);
    }

    #[test]
    fn test_png_signature() {
        let png = MaskEncoder::to_png(&BinaryMask::new(4, 4)).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(
            MaskEncoder::from_png_base64("not base64!"),
            Err(LayerKitError::InvalidInput(_))
        ));
    }
}
