//! Image I/O operations service
//!
//! This module separates decoding, content sniffing and fingerprinting from
//! the pipeline, making both easier to test.

use crate::error::{LayerKitError, Result};
use image::{DynamicImage, ImageFormat};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Service for loading and identifying input images
pub struct ImageIOService;

impl ImageIOService {
    /// Load an image from a file path
    ///
    /// Extension-based format detection is tried first, then the content is
    /// sniffed.
    ///
    /// # Examples
    /// ```rust,no_run
    /// use layerkit::services::ImageIOService;
    ///
    /// let image = ImageIOService::load_image("input.jpg")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(LayerKitError::file_io_error(
                "read image file",
                path_ref,
                &std::io::Error::new(std::io::ErrorKind::NotFound, "file does not exist"),
            ));
        }

        match image::open(path_ref) {
            Ok(img) => Ok(img),
            Err(e) => {
                log::debug!(
                    "Extension-based loading failed for {}: {}. Trying content detection.",
                    path_ref.display(),
                    e
                );

                let data = std::fs::read(path_ref).map_err(|io_err| {
                    LayerKitError::file_io_error("read image data", path_ref, &io_err)
                })?;

                image::load_from_memory(&data).map_err(|content_err| {
                    let extension = path_ref
                        .extension()
                        .and_then(|s| s.to_str())
                        .unwrap_or("unknown");

                    LayerKitError::processing_stage_error(
                        "image loading",
                        &format!(
                            "Failed to load image by extension ({}) and by content. \
                             Extension error: {}. Content error: {}",
                            extension, e, content_err
                        ),
                        Some(&format!("path: {}, size: {} bytes", path_ref.display(), data.len())),
                    )
                })
            },
        }
    }

    /// Decode an in-memory image
    ///
    /// Any decode failure is reported as a processing error for this request.
    pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
        image::load_from_memory(bytes).map_err(|e| {
            LayerKitError::processing_stage_error(
                "image loading",
                &format!("Failed to decode image: {}", e),
                Some(&format!("size: {} bytes", bytes.len())),
            )
        })
    }

    /// Lowercase hex SHA-256 of the raw bytes
    #[must_use]
    pub fn fingerprint(bytes: &[u8]) -> String {
        let digest = Sha256::digest(bytes);
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// MIME type guessed from the leading bytes
    #[must_use]
    pub fn sniff_content_type(bytes: &[u8]) -> Option<&'static str> {
        image::guess_format(bytes).ok().map(|format| format.to_mime_type())
    }

    /// MIME type implied by a file extension
    #[must_use]
    pub fn content_type_for_path<P: AsRef<Path>>(path: P) -> Option<&'static str> {
        ImageFormat::from_path(path).ok().map(|format| format.to_mime_type())
    }
}
