//! Selector Cache
//!
//! Persistent mapping from (domain, failed selector, action hint) to a healed
//! selector. Every call re-reads the backing store so several processes can
//! share one cache file; the worst a stale read costs is an extra resolution
//! pass.
//!
//! The cache never fails the caller: read errors are misses and write errors
//! are logged and dropped.

pub mod entry;
pub mod store;

pub use entry::{HealMethod, SelectorCacheEntry, cache_key, domain_of};
pub use store::{CacheError, CacheMap, CacheStore, JsonFileStore, MemoryStore};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_TTL_DAYS: u32 = 30;

/// Source of "now" for expiry decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub total_hits: u64,
    pub by_method: BTreeMap<HealMethod, usize>,
    pub location: String,
}

pub struct SelectorCache {
    store: Arc<dyn CacheStore>,
    ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl SelectorCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: chrono::Duration) -> Self {
        Self {
            store,
            ttl,
            clock: Arc::new(SystemClock),
        }
    }

    /// File-backed cache with a TTL in days.
    pub fn open(path: impl Into<PathBuf>, ttl_days: u32) -> Self {
        Self::new(
            Arc::new(JsonFileStore::new(path)),
            chrono::Duration::days(i64::from(ttl_days)),
        )
    }

    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryStore::new()),
            chrono::Duration::days(i64::from(DEFAULT_TTL_DAYS)),
        )
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn ttl(&self) -> chrono::Duration {
        self.ttl
    }

    /// Look up a healed selector. A hit bumps and persists the hit counter;
    /// an expired entry is removed.
    pub async fn get(
        &self,
        page_url: &str,
        failed_selector: &str,
        action_hint: &str,
    ) -> Option<String> {
        let key = cache_key(&domain_of(page_url), failed_selector, action_hint);

        let mut entries = match self.store.load().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Selector cache read failed, treating as miss: {}", e);
                return None;
            }
        };

        let now = self.clock.now();
        if entries.get(&key)?.is_expired(now, self.ttl) {
            debug!("Selector cache entry for {} expired", failed_selector);
            entries.remove(&key);
            self.persist(&entries).await;
            return None;
        }

        let entry = entries.get_mut(&key)?;
        entry.hit_count += 1;
        let healed = entry.healed_selector.clone();
        debug!("Selector cache hit: {} -> {}", failed_selector, healed);
        self.persist(&entries).await;
        Some(healed)
    }

    /// Store a healing, replacing any entry under the same key and resetting
    /// its hit counter.
    pub async fn set(
        &self,
        page_url: &str,
        failed_selector: &str,
        action_hint: &str,
        healed_selector: &str,
        method: HealMethod,
    ) {
        let domain = domain_of(page_url);
        let key = cache_key(&domain, failed_selector, action_hint);

        let mut entries = match self.store.load().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Selector cache read failed, skipping write: {}", e);
                return;
            }
        };

        entries.insert(
            key,
            SelectorCacheEntry {
                failed_selector: failed_selector.to_string(),
                healed_selector: healed_selector.to_string(),
                action_hint: action_hint.to_string(),
                method,
                created_at: self.clock.now(),
                hit_count: 0,
                url_pattern: domain,
            },
        );
        self.persist(&entries).await;
    }

    /// Remove every expired entry. Returns how many were removed.
    pub async fn clear_expired(&self) -> usize {
        let mut entries = match self.store.load().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Selector cache read failed, nothing cleared: {}", e);
                return 0;
            }
        };

        let now = self.clock.now();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now, self.ttl));
        let removed = before - entries.len();

        if removed > 0 {
            self.persist(&entries).await;
            debug!("Cleared {} expired selector cache entries", removed);
        }
        removed
    }

    pub async fn clear_all(&self) {
        self.persist(&CacheMap::new()).await;
    }

    pub async fn stats(&self) -> CacheStats {
        let entries = self.store.load().await.unwrap_or_else(|e| {
            warn!("Selector cache read failed: {}", e);
            CacheMap::new()
        });

        let mut by_method = BTreeMap::new();
        for entry in entries.values() {
            *by_method.entry(entry.method).or_insert(0) += 1;
        }

        CacheStats {
            total_entries: entries.len(),
            total_hits: entries.values().map(|e| e.hit_count).sum(),
            by_method,
            location: self.store.location(),
        }
    }

    async fn persist(&self, entries: &CacheMap) {
        if let Err(e) = self.store.save(entries).await {
            warn!("Selector cache write failed: {}", e);
        }
    }
}
