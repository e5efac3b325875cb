//! Upload validation and result caching through the layer service

mod common;

use common::{encode_png, square_scene};
use layerkit::{
    cache_key, FileResultCache, GrabCutConfig, ImageIOService, ImageUpload, LayerKitError,
    LayerProcessor, LayerResult, LayerService, ProcessOptions, Rect, Result, ResultCache,
    UploadConfig,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const TTL: Duration = Duration::from_secs(3600);

/// Equal up to float formatting of the confidences
fn assert_same_result(actual: &LayerResult, expected: &LayerResult) {
    assert_eq!(actual.content_hash, expected.content_hash);
    assert_eq!((actual.width, actual.height), (expected.width, expected.height));
    assert_eq!(actual.layers.len(), expected.layers.len());
    for (a, e) in actual.layers.iter().zip(&expected.layers) {
        assert_eq!((a.id, a.layer_type, a.bounding_box), (e.id, e.layer_type, e.bounding_box));
        assert_eq!(a.mask, e.mask);
        assert!((a.confidence - e.confidence).abs() < 1e-12);
    }
}

fn service_with_cache(cache: Arc<dyn ResultCache>) -> Result<LayerService> {
    let processor = LayerProcessor::new(&GrabCutConfig::default())?;
    Ok(LayerService::new(processor, UploadConfig::default()).with_cache(cache))
}

#[tokio::test]
async fn test_file_cache_serves_repeat_uploads_across_instances() -> Result<()> {
    let dir = TempDir::new()?;
    let bytes = encode_png(&square_scene(96, 96, Rect::new(30, 30, 36, 36)));
    let fingerprint = ImageIOService::fingerprint(&bytes);

    let service = service_with_cache(Arc::new(FileResultCache::with_custom_cache_dir(
        dir.path(),
        TTL,
    )?))?;
    let upload = ImageUpload::new(bytes.clone()).with_content_type("image/png");
    let first = service.process_upload(upload, ProcessOptions::default()).await?;
    assert!(!first.from_cache);

    // A fresh cache over the same directory sees the stored entry
    let reopened = FileResultCache::with_custom_cache_dir(dir.path(), TTL)?;
    let stored = reopened
        .get(&cache_key(&fingerprint, ProcessOptions::default()))
        .await?
        .expect("stored result");
    assert_same_result(&stored, &first.result);

    let service = service_with_cache(Arc::new(reopened))?;
    let second = service
        .process_upload(
            ImageUpload::new(bytes).with_content_type("image/png"),
            ProcessOptions::default(),
        )
        .await?;
    assert!(second.from_cache);
    assert_same_result(&second.result, &first.result);
    let looked_up = service.lookup(&fingerprint).await?.expect("lookup hit");
    assert_same_result(&looked_up, &first.result);
    Ok(())
}

#[tokio::test]
async fn test_process_file_derives_content_type_from_extension() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("scene.png");
    std::fs::write(
        &path,
        encode_png(&square_scene(80, 80, Rect::new(20, 20, 30, 30))),
    )?;
    let cache_dir = dir.path().join("cache");
    let service = service_with_cache(Arc::new(FileResultCache::with_custom_cache_dir(
        &cache_dir, TTL,
    )?))?;

    let response = service.process_file(&path, ProcessOptions::default()).await?;
    assert_eq!((response.result.width, response.result.height), (80, 80));
    Ok(())
}

#[tokio::test]
async fn test_upload_rules_are_enforced_before_processing() -> Result<()> {
    let processor = LayerProcessor::new(&GrabCutConfig::default())?;
    let upload_config = UploadConfig {
        max_size: 64,
        ..UploadConfig::default()
    };
    let service = LayerService::new(processor, upload_config);

    let too_large = ImageUpload::new(vec![0u8; 65]).with_content_type("image/png");
    let err = service
        .process_upload(too_large, ProcessOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, LayerKitError::InvalidInput(_)));

    let wrong_type = ImageUpload::new(vec![0u8; 16]).with_content_type("image/gif");
    let err = service
        .process_upload(wrong_type, ProcessOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, LayerKitError::UnsupportedFormat(_)));
    Ok(())
}
