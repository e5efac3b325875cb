//! Result cache for finished layer decompositions
//!
//! Results are keyed by content fingerprint plus processing variant, so a
//! re-upload of the same bytes with the same options is served without
//! running the pipeline. Cache access is best-effort: callers log and ignore
//! its errors.
//!
//! File-backed entries live in an XDG-compliant directory:
//! - Linux/macOS: `~/.cache/layerkit/results/`
//! - Windows: `%LOCALAPPDATA%/layerkit/results/`

use crate::config::CacheConfig;
use crate::error::{LayerKitError, Result};
use crate::types::{LayerResult, ProcessOptions};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Environment variable overriding the cache root
pub const CACHE_DIR_ENV: &str = "LAYERKIT_CACHE_DIR";

const KEY_PREFIX: &str = "layer:";
const FOREGROUND_ONLY_SUFFIX: &str = ":max_fg";

/// Cache key for a fingerprint and processing variant
///
/// # Examples
/// ```
/// use layerkit::{cache::cache_key, ProcessOptions};
///
/// assert_eq!(cache_key("ab12", ProcessOptions::default()), "layer:ab12");
/// assert_eq!(cache_key("ab12", ProcessOptions::foreground_only()), "layer:ab12:max_fg");
/// ```
#[must_use]
pub fn cache_key(fingerprint: &str, options: ProcessOptions) -> String {
    if options.foreground_only {
        format!("{KEY_PREFIX}{fingerprint}{FOREGROUND_ONLY_SUFFIX}")
    } else {
        format!("{KEY_PREFIX}{fingerprint}")
    }
}

/// Key-value store for layer results
#[async_trait]
pub trait ResultCache: Send + Sync {
    /// Cached result, or `None` on a miss or an expired entry
    async fn get(&self, key: &str) -> Result<Option<LayerResult>>;

    async fn set(&self, key: &str, result: &LayerResult) -> Result<()>;

    /// Remove one entry; returns whether it existed
    async fn remove(&self, key: &str) -> Result<bool>;

    /// Remove every entry; returns how many were removed
    async fn clear(&self) -> Result<usize>;
}

/// In-process cache with a fixed entry lifetime
#[derive(Debug)]
pub struct MemoryResultCache {
    entries: RwLock<HashMap<String, (Instant, LayerResult)>>,
    ttl: Duration,
}

impl MemoryResultCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Drop every entry older than the TTL; returns how many were dropped
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        Self::retain_fresh(&mut entries, self.ttl)
    }

    fn retain_fresh(entries: &mut HashMap<String, (Instant, LayerResult)>, ttl: Duration) -> usize {
        let before = entries.len();
        entries.retain(|_, (stored, _)| stored.elapsed() <= ttl);
        before - entries.len()
    }
}

#[async_trait]
impl ResultCache for MemoryResultCache {
    async fn get(&self, key: &str) -> Result<Option<LayerResult>> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return Ok(None),
                Some((stored, result)) if stored.elapsed() <= self.ttl => {
                    return Ok(Some(result.clone()));
                },
                Some(_) => {},
            }
        }
        log::debug!("Evicting expired cache entry {}", key);
        self.entries.write().await.remove(key);
        Ok(None)
    }

    /// Expired entries are swept on every write, so the map only holds live results
    async fn set(&self, key: &str, result: &LayerResult) -> Result<()> {
        let mut entries = self.entries.write().await;
        let evicted = Self::retain_fresh(&mut entries, self.ttl);
        if evicted > 0 {
            log::debug!("Evicted {} expired cache entries", evicted);
        }
        entries.insert(key.to_string(), (Instant::now(), result.clone()));
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn clear(&self) -> Result<usize> {
        let mut entries = self.entries.write().await;
        let count = entries.len();
        entries.clear();
        Ok(count)
    }
}

/// On-disk entry layout
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    /// Unix seconds at which the entry was written
    stored_at: i64,
    result: LayerResult,
}

/// Summary of the file cache contents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub size_bytes: u64,
}

/// One JSON file per entry under the cache directory
#[derive(Debug, Clone)]
pub struct FileResultCache {
    cache_dir: PathBuf,
    ttl: Duration,
}

impl FileResultCache {
    /// Cache in the default location
    ///
    /// # Errors
    /// - Failed to determine or create the cache directory
    pub fn new(ttl: Duration) -> Result<Self> {
        Self::with_custom_cache_dir(&Self::get_cache_dir()?, ttl)
    }

    /// Cache rooted at `cache_dir` (used as is, no `layerkit/results` suffix)
    pub fn with_custom_cache_dir(cache_dir: &Path, ttl: Duration) -> Result<Self> {
        if !cache_dir.exists() {
            std::fs::create_dir_all(cache_dir).map_err(|e| {
                LayerKitError::file_io_error("create cache directory", cache_dir, &e)
            })?;
        }
        Ok(Self {
            cache_dir: cache_dir.to_path_buf(),
            ttl,
        })
    }

    /// Cache honoring the configured directory and TTL
    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        match &config.directory {
            Some(dir) => Self::with_custom_cache_dir(dir, config.ttl),
            None => Self::new(config.ttl),
        }
    }

    /// Default cache directory, honoring `LAYERKIT_CACHE_DIR`
    ///
    /// # Errors
    /// - Failed to determine user cache directory
    pub fn get_cache_dir() -> Result<PathBuf> {
        if let Ok(cache_override) = std::env::var(CACHE_DIR_ENV) {
            return Ok(PathBuf::from(cache_override).join("results"));
        }

        Ok(dirs::cache_dir()
            .ok_or_else(|| {
                LayerKitError::invalid_config(format!(
                    "Failed to determine cache directory. Set {CACHE_DIR_ENV} environment variable."
                ))
            })?
            .join("layerkit")
            .join("results"))
    }

    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// File backing `key`
    #[must_use]
    pub fn entry_path(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        self.cache_dir.join(format!("{name}.json"))
    }

    /// Entry count and total size of the cache directory
    pub async fn stats(&self) -> Result<CacheStats> {
        let mut stats = CacheStats::default();
        for path in self.entry_files().await? {
            if let Ok(metadata) = tokio::fs::metadata(&path).await {
                stats.entries += 1;
                stats.size_bytes += metadata.len();
            }
        }
        Ok(stats)
    }

    async fn entry_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        if !self.cache_dir.exists() {
            return Ok(files);
        }
        let mut entries = tokio::fs::read_dir(&self.cache_dir).await.map_err(|e| {
            LayerKitError::file_io_error("read cache directory", &self.cache_dir, &e)
        })?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
            {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn is_expired(&self, stored_at: i64) -> bool {
        let age = chrono::Utc::now().timestamp().saturating_sub(stored_at);
        age < 0 || age as u64 > self.ttl.as_secs()
    }
}

#[async_trait]
impl ResultCache for FileResultCache {
    async fn get(&self, key: &str) -> Result<Option<LayerResult>> {
        let path = self.entry_path(key);
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(LayerKitError::file_io_error("read cache entry", &path, &e)),
        };

        let entry: CacheEntry = serde_json::from_slice(&data).map_err(|e| {
            LayerKitError::cache(format!("Corrupt cache entry '{}': {}", path.display(), e))
        })?;

        if self.is_expired(entry.stored_at) {
            log::debug!("Cache entry {} expired", path.display());
            if let Err(e) = tokio::fs::remove_file(&path).await {
                log::debug!("Failed to remove expired entry {}: {}", path.display(), e);
            }
            return Ok(None);
        }
        Ok(Some(entry.result))
    }

    async fn set(&self, key: &str, result: &LayerResult) -> Result<()> {
        let entry = CacheEntry {
            stored_at: chrono::Utc::now().timestamp(),
            result: result.clone(),
        };
        let json = serde_json::to_vec(&entry)?;
        let dir = self.cache_dir.clone();
        let path = self.entry_path(key);

        // Write to a temp file in the same directory, then rename over the entry
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut tmp = tempfile::NamedTempFile::new_in(&dir)
                .map_err(|e| LayerKitError::file_io_error("create temp cache file", &dir, &e))?;
            tmp.write_all(&json)
                .map_err(|e| LayerKitError::file_io_error("write cache entry", tmp.path(), &e))?;
            tmp.persist(&path)
                .map_err(|e| LayerKitError::file_io_error("persist cache entry", &path, &e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| LayerKitError::cache(format!("Cache write task failed: {e}")))?
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let path = self.entry_path(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(LayerKitError::file_io_error("remove cache entry", &path, &e)),
        }
    }

    async fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for path in self.entry_files().await? {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) => log::warn!("Failed to remove cache entry {}: {}", path.display(), e),
            }
        }
        Ok(removed)
    }
}

/// Format file size in human-readable format
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS.get(unit_index).unwrap_or(&"B"))
    } else {
        format!("{:.1} {}", size, UNITS.get(unit_index).unwrap_or(&"B"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, Layer, LayerType};
    use tempfile::TempDir;

    fn sample_result(hash: &str) -> LayerResult {
        LayerResult {
            content_hash: hash.to_string(),
            width: 10,
            height: 8,
            layers: vec![Layer {
                id: 1,
                layer_type: LayerType::Foreground,
                bounding_box: BoundingBox::zero(),
                mask: "AAAA".to_string(),
                confidence: 0.05,
            }],
            timestamp: 1_700_000_000,
        }
    }

    #[test]
    fn test_cache_key_variants() {
        assert_eq!(cache_key("f00d", ProcessOptions::default()), "layer:f00d");
        assert_eq!(
            cache_key("f00d", ProcessOptions::foreground_only()),
            "layer:f00d:max_fg"
        );
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(10 * 1024 * 1024), "10.0 MB");
    }

    #[tokio::test]
    async fn test_memory_cache_roundtrip() {
        let cache = MemoryResultCache::new(Duration::from_secs(60));
        assert!(cache.get("layer:a").await.unwrap().is_none());

        cache.set("layer:a", &sample_result("a")).await.unwrap();
        assert_eq!(cache.get("layer:a").await.unwrap(), Some(sample_result("a")));
        assert!(cache.remove("layer:a").await.unwrap());
        assert!(!cache.remove("layer:a").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_cache_expires() {
        let cache = MemoryResultCache::new(Duration::from_secs(10));
        cache.set("layer:a", &sample_result("a")).await.unwrap();

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(cache.get("layer:a").await.unwrap().is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_cache_sweeps_expired_entries_on_write() {
        let cache = MemoryResultCache::new(Duration::from_secs(10));
        for key in ["layer:a", "layer:b", "layer:c"] {
            cache.set(key, &sample_result(key)).await.unwrap();
        }

        tokio::time::advance(Duration::from_secs(6)).await;
        cache.set("layer:d", &sample_result("d")).await.unwrap();
        assert_eq!(cache.len().await, 4);

        tokio::time::advance(Duration::from_secs(6)).await;
        cache.set("layer:e", &sample_result("e")).await.unwrap();
        assert_eq!(cache.len().await, 2);
        assert!(cache.get("layer:d").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(cache.purge_expired().await, 2);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_file_cache_roundtrip_and_clear() {
        let dir = TempDir::new().unwrap();
        let cache =
            FileResultCache::with_custom_cache_dir(dir.path(), Duration::from_secs(60)).unwrap();

        cache.set("layer:a", &sample_result("a")).await.unwrap();
        cache.set("layer:a:max_fg", &sample_result("a")).await.unwrap();
        assert!(dir.path().join("layer_a_max_fg.json").exists());
        assert_eq!(cache.get("layer:a").await.unwrap(), Some(sample_result("a")));
        assert!(cache.get("layer:b").await.unwrap().is_none());

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.entries, 2);
        assert!(stats.size_bytes > 0);

        assert_eq!(cache.clear().await.unwrap(), 2);
        assert!(cache.get("layer:a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_cache_expired_entry_is_miss() {
        let dir = TempDir::new().unwrap();
        let cache =
            FileResultCache::with_custom_cache_dir(dir.path(), Duration::from_secs(60)).unwrap();
        let stale = CacheEntry {
            stored_at: chrono::Utc::now().timestamp() - 3600,
            result: sample_result("old"),
        };
        std::fs::write(cache.entry_path("layer:old"), serde_json::to_vec(&stale).unwrap()).unwrap();

        assert!(cache.get("layer:old").await.unwrap().is_none());
        assert!(!cache.entry_path("layer:old").exists());
    }

    #[tokio::test]
    async fn test_file_cache_corrupt_entry_is_cache_error() {
        let dir = TempDir::new().unwrap();
        let cache =
            FileResultCache::with_custom_cache_dir(dir.path(), Duration::from_secs(60)).unwrap();
        std::fs::write(cache.entry_path("layer:bad"), b"{not json").unwrap();

        let err = cache.get("layer:bad").await.unwrap_err();
        assert!(matches!(err, LayerKitError::Cache(_)));
    }
}
