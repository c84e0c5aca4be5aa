//! moka-backed cache with a TTL per entry
//!
//! Values are stored as JSON so any serialisable search result fits. The
//! TTL passed to [`MemoryCache::set`] is capped by the configured default.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use moka::future::Cache;
use moka::Expiry;
use serde::{de::DeserializeOwned, Serialize};

#[derive(Clone)]
struct Entry {
    json: Arc<str>,
    ttl: Duration,
}

struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, entry: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _updated_at: Instant,
        _remaining: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

pub struct MemoryCache {
    cache: Cache<String, Entry>,
    max_ttl: Duration,
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entries", &self.cache.entry_count())
            .field("max_ttl", &self.max_ttl)
            .finish()
    }
}

impl MemoryCache {
    pub fn with_capacity_and_ttl(max_capacity: u64, max_ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(PerEntryTtl)
            .build();
        Self { cache, max_ttl }
    }

    pub fn max_ttl(&self) -> Duration {
        self.max_ttl
    }

    /// Approximate; eviction bookkeeping runs lazily
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// `Ok(None)` on a miss; an error when the stored JSON no longer fits `T`
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(entry) = self.cache.get(key).await else {
            return Ok(None);
        };
        let value = serde_json::from_str(&entry.json)
            .with_context(|| format!("Cached value for {} has an unexpected shape", key))?;
        Ok(Some(value))
    }

    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let json = serde_json::to_string(value).context("Failed to serialize cache value")?;
        let entry = Entry {
            json: json.into(),
            ttl: ttl.min(self.max_ttl),
        };
        self.cache.insert(key.to_string(), entry).await;
        Ok(())
    }

    pub async fn remove(&self, key: &str) {
        self.cache.invalidate(key).await;
    }
}
