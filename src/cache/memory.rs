//! In-process volatile store
//!
//! Moka cache with a per-entry TTL, so each `set_with_ttl` call decides how
//! long its own entry lives.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::sync::Cache;
use moka::Expiry;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::tier::VolatileStore;

/// Default maximum number of cached pages
pub const DEFAULT_CAPACITY: u64 = 10_000;

#[derive(Clone, Debug)]
struct CachedValue {
    bytes: Arc<[u8]>,
    ttl: Duration,
}

/// Expires every entry after the TTL it was written with
struct PerEntryTtl;

impl Expiry<String, CachedValue> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CachedValue,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Hit/miss counters for the status surface
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub entries: u64,
}

/// Volatile store backed by an in-memory moka cache
pub struct MemoryStore {
    cache: Cache<String, CachedValue>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryStore {
    /// Create a store holding at most `capacity` entries
    pub fn new(capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .expire_after(PerEntryTtl)
            .name("volatile_page_cache")
            .build();

        Self {
            cache,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        CacheStats {
            hits,
            misses,
            hit_rate,
            entries: self.cache.entry_count(),
        }
    }

    /// Log current cache metrics
    pub fn log_metrics(&self) {
        let stats = self.stats();
        debug!(
            hits = stats.hits,
            misses = stats.misses,
            hit_rate = format!("{:.1}%", stats.hit_rate),
            entries = stats.entries,
            "Volatile cache metrics"
        );
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl VolatileStore for MemoryStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        match self.cache.get(key) {
            Some(cached) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(key = key, "Memory cache HIT");
                Ok(Some(cached.bytes.to_vec()))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                trace!(key = key, "Memory cache MISS");
                Ok(None)
            }
        }
    }

    async fn set_with_ttl(&self, key: &str, value: Vec<u8>, ttl: Duration) -> anyhow::Result<()> {
        let size = value.len();
        self.cache.insert(
            key.to_string(),
            CachedValue {
                bytes: value.into(),
                ttl,
            },
        );
        debug!(key = key, size = size, ttl_secs = ttl.as_secs(), "Cached page");
        Ok(())
    }
}
