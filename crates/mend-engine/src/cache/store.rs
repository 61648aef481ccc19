use super::entry::SelectorCacheEntry;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

pub type CacheMap = BTreeMap<String, SelectorCacheEntry>;

/// Distinguishes temp files of concurrent saves within one process.
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Durable backing for the selector cache.
///
/// Implementations own their atomicity: a `save` either lands completely or
/// leaves the previous contents in place.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn load(&self) -> Result<CacheMap, CacheError>;

    async fn save(&self, entries: &CacheMap) -> Result<(), CacheError>;

    /// Human-readable location for stats output.
    fn location(&self) -> String;
}

/// A JSON object on disk mapping hex keys to entries.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "selector_cache.json".to_string());
        let seq = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.path
            .with_file_name(format!(".{}.{}.{}.tmp", name, std::process::id(), seq))
    }

    async fn write_synced(path: &Path, contents: &[u8]) -> std::io::Result<()> {
        let mut file = fs::File::create(path).await?;
        file.write_all(contents).await?;
        file.sync_all().await
    }
}

#[async_trait]
impl CacheStore for JsonFileStore {
    async fn load(&self) -> Result<CacheMap, CacheError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(CacheMap::new()),
            Err(e) => return Err(e.into()),
        };

        // A corrupt file is replaced on the next write rather than wedging the cache.
        let raw: BTreeMap<String, serde_json::Value> = match serde_json::from_str(&content) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Selector cache {} is unreadable, starting empty: {}", self.path.display(), e);
                return Ok(CacheMap::new());
            }
        };

        let mut entries = CacheMap::new();
        for (key, value) in raw {
            match serde_json::from_value::<SelectorCacheEntry>(value) {
                Ok(entry) => {
                    entries.insert(key, entry);
                }
                Err(e) => warn!("Skipping malformed cache entry {}: {}", key, e),
            }
        }
        Ok(entries)
    }

    async fn save(&self, entries: &CacheMap) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(entries)?;
        let tmp = self.temp_path();
        let written = match Self::write_synced(&tmp, json.as_bytes()).await {
            Ok(()) => fs::rename(&tmp, &self.path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// Process-local store, for tests and for callers that opt out of persistence.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<CacheMap>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn load(&self) -> Result<CacheMap, CacheError> {
        Ok(self.entries.lock().await.clone())
    }

    async fn save(&self, entries: &CacheMap) -> Result<(), CacheError> {
        *self.entries.lock().await = entries.clone();
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_paths_are_unique_per_save() {
        let a = JsonFileStore::new("/tmp/cache/selector_cache.json");
        let b = JsonFileStore::new("/tmp/cache/selector_cache.json");
        let first = a.temp_path();
        let second = b.temp_path();
        assert_ne!(first, second);
        assert_eq!(first.parent(), Some(Path::new("/tmp/cache")));
        assert!(
            first
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with(".selector_cache.json.")
        );
    }
}
