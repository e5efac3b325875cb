//! Upload handling around the layer processor
//!
//! [`LayerService`] validates uploads, fingerprints them, consults the result
//! cache and only then asks the [`LayerProcessor`] for a fresh decomposition.

use crate::cache::{cache_key, ResultCache};
use crate::config::UploadConfig;
use crate::error::{LayerKitError, Result};
use crate::processor::LayerProcessor;
use crate::services::ImageIOService;
use crate::tracing_config::{events, spans};
use crate::types::{LayerResult, ProcessOptions};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

/// An uploaded image as received from a client
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    /// Declared MIME type; sniffed from the bytes when absent
    pub content_type: Option<String>,
    pub file_name: Option<String>,
}

impl ImageUpload {
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            content_type: None,
            file_name: None,
        }
    }

    #[must_use]
    pub fn with_content_type<S: Into<String>>(mut self, content_type: S) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    #[must_use]
    pub fn with_file_name<S: Into<String>>(mut self, file_name: S) -> Self {
        self.file_name = Some(file_name.into());
        self
    }
}

/// Layer result plus whether it came from the cache
#[derive(Debug, Clone)]
pub struct LayerResponse {
    pub result: LayerResult,
    pub from_cache: bool,
}

/// Validating, caching front of the layer processor
#[derive(Clone)]
pub struct LayerService {
    processor: LayerProcessor,
    upload: UploadConfig,
    cache: Option<Arc<dyn ResultCache>>,
}

impl std::fmt::Debug for LayerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerService")
            .field("processor", &self.processor)
            .field("upload", &self.upload)
            .field("cache", &self.cache.is_some())
            .finish()
    }
}

impl LayerService {
    #[must_use]
    pub fn new(processor: LayerProcessor, upload: UploadConfig) -> Self {
        Self {
            processor,
            upload,
            cache: None,
        }
    }

    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn processor(&self) -> &LayerProcessor {
        &self.processor
    }

    /// Validate, fingerprint and decompose an upload
    ///
    /// # Errors
    /// - `InvalidInput` for empty or oversized uploads
    /// - `UnsupportedFormat` for content types outside the allow-list
    /// - `QueueFull` / `Processing` from the processor
    pub async fn process_upload(
        &self,
        upload: ImageUpload,
        options: ProcessOptions,
    ) -> Result<LayerResponse> {
        self.validate(&upload)?;

        let fingerprint = ImageIOService::fingerprint(&upload.bytes);
        let key = cache_key(&fingerprint, options);
        debug!(
            fingerprint = %fingerprint,
            file_name = upload.file_name.as_deref().unwrap_or("<unnamed>"),
            size = upload.bytes.len(),
            "Accepted upload"
        );

        if let Some(result) = self.cached(&key).await {
            info!(fingerprint = %fingerprint, "Serving cached layers");
            return Ok(LayerResponse {
                result,
                from_cache: true,
            });
        }

        let result = self
            .processor
            .process_bytes(upload.bytes, &fingerprint, options)
            .await?;

        if let Some(cache) = &self.cache {
            let span = spans::cache_operation("store", &key);
            if let Err(e) = cache.set(&key, &result).instrument(span).await {
                warn!(key = %key, error = %e, "Failed to store result in cache");
            }
        }

        Ok(LayerResponse {
            result,
            from_cache: false,
        })
    }

    /// Read an image file and process it as an upload
    ///
    /// The content type is derived from the file extension.
    pub async fn process_file<P: AsRef<Path>>(
        &self,
        path: P,
        options: ProcessOptions,
    ) -> Result<LayerResponse> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| LayerKitError::file_io_error("read image file", path, &e))?;

        let mut upload = ImageUpload::new(bytes);
        if let Some(content_type) = ImageIOService::content_type_for_path(path) {
            upload = upload.with_content_type(content_type);
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            upload = upload.with_file_name(name);
        }
        self.process_upload(upload, options).await
    }

    /// Previously computed default-variant result for a fingerprint
    pub async fn lookup(&self, fingerprint: &str) -> Result<Option<LayerResult>> {
        let Some(cache) = &self.cache else {
            return Ok(None);
        };
        cache.get(&cache_key(fingerprint, ProcessOptions::default())).await
    }

    fn validate(&self, upload: &ImageUpload) -> Result<()> {
        if upload.bytes.is_empty() {
            return Err(LayerKitError::invalid_input("Upload is empty"));
        }
        if upload.bytes.len() as u64 > self.upload.max_size {
            return Err(LayerKitError::invalid_input(format!(
                "Upload of {} bytes exceeds the {} byte limit",
                upload.bytes.len(),
                self.upload.max_size
            )));
        }

        let content_type = match upload.content_type.as_deref() {
            Some(declared) => declared.to_string(),
            None => ImageIOService::sniff_content_type(&upload.bytes)
                .unwrap_or("application/octet-stream")
                .to_string(),
        };
        if !self.upload.allows(&content_type) {
            return Err(LayerKitError::unsupported_format(content_type));
        }
        Ok(())
    }

    async fn cached(&self, key: &str) -> Option<LayerResult> {
        let cache = self.cache.as_ref()?;
        match cache.get(key).await {
            Ok(Some(hit)) => {
                events::cache_hit(key);
                Some(hit)
            },
            Ok(None) => {
                events::cache_miss(key);
                None
            },
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed, processing anyway");
                None
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryResultCache;
    use crate::config::GrabCutConfig;
    use async_trait::async_trait;
    use image::{ImageFormat, RgbImage};
    use std::io::Cursor;
    use std::time::Duration;

    struct FailingCache;

    #[async_trait]
    impl ResultCache for FailingCache {
        async fn get(&self, _key: &str) -> Result<Option<LayerResult>> {
            Err(LayerKitError::cache("backend unavailable"))
        }
        async fn set(&self, _key: &str, _result: &LayerResult) -> Result<()> {
            Err(LayerKitError::cache("backend unavailable"))
        }
        async fn remove(&self, _key: &str) -> Result<bool> {
            Ok(false)
        }
        async fn clear(&self) -> Result<usize> {
            Ok(0)
        }
    }

    fn png() -> Vec<u8> {
        let image = RgbImage::from_fn(48, 48, |x, y| {
            if (14..34).contains(&x) && (14..34).contains(&y) {
                image::Rgb([0, 0, 0])
            } else {
                image::Rgb([255, 255, 255])
            }
        });
        let mut out = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        out
    }

    fn service() -> LayerService {
        let processor = LayerProcessor::new(&GrabCutConfig::default()).unwrap();
        LayerService::new(processor, UploadConfig::default())
    }

    #[tokio::test]
    async fn test_rejects_empty_and_oversized() {
        let err = service()
            .process_upload(ImageUpload::new(Vec::new()), ProcessOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LayerKitError::InvalidInput(_)));

        let mut upload = UploadConfig::default();
        upload.max_size = 16;
        let small = LayerService::new(service().processor().clone(), upload);
        let err = small
            .process_upload(ImageUpload::new(png()), ProcessOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LayerKitError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_rejects_disallowed_types() {
        let err = service()
            .process_upload(
                ImageUpload::new(png()).with_content_type("image/gif"),
                ProcessOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LayerKitError::UnsupportedFormat(_)));

        let err = service()
            .process_upload(ImageUpload::new(b"plain text".to_vec()), ProcessOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LayerKitError::UnsupportedFormat(_)));
    }

    #[tokio::test]
    async fn test_second_upload_is_served_from_cache() {
        let cache = Arc::new(MemoryResultCache::new(Duration::from_secs(60)));
        let service = service().with_cache(cache.clone());

        let first = service
            .process_upload(ImageUpload::new(png()), ProcessOptions::default())
            .await
            .unwrap();
        let second = service
            .process_upload(ImageUpload::new(png()), ProcessOptions::default())
            .await
            .unwrap();

        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert_eq!(first.result, second.result);

        let looked_up = service.lookup(&first.result.content_hash).await.unwrap();
        assert_eq!(looked_up, Some(first.result));
    }

    #[tokio::test]
    async fn test_variants_are_cached_separately() {
        let cache = Arc::new(MemoryResultCache::new(Duration::from_secs(60)));
        let service = service().with_cache(cache.clone());

        service
            .process_upload(ImageUpload::new(png()), ProcessOptions::default())
            .await
            .unwrap();
        let isolated = service
            .process_upload(ImageUpload::new(png()), ProcessOptions::foreground_only())
            .await
            .unwrap();

        assert!(!isolated.from_cache);
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn test_cache_failures_are_ignored() {
        let service = service().with_cache(Arc::new(FailingCache));
        let response = service
            .process_upload(ImageUpload::new(png()), ProcessOptions::default())
            .await
            .unwrap();
        assert!(!response.from_cache);
    }

    #[tokio::test]
    async fn test_lookup_without_cache_is_none() {
        assert!(service().lookup("abc").await.unwrap().is_none());
    }
}
