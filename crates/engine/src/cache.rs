use perpdata_core::MarketDataError;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::trace;

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Hit/miss counters. Owned by whoever builds the caches; several caches
/// may share one instance.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    /// `hits / (hits + misses)`, zero before any lookup.
    pub hit_rate: f64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStatsSnapshot {
            hits,
            misses,
            hit_rate: if total == 0 { 0.0 } else { hits as f64 / total as f64 },
        }
    }

    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// Deterministic cache key for a call.
///
/// Keyword arguments are sorted by name first, so the same call spelled with
/// a different argument order maps to the same key.
pub fn derive_key(scope: &str, args: &[&str], kwargs: &[(&str, String)]) -> String {
    let mut kwargs: Vec<&(&str, String)> = kwargs.iter().collect();
    kwargs.sort_by(|a, b| a.0.cmp(b.0));
    let kwargs: Vec<String> = kwargs.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    format!("{}:({}):{{{}}}", scope, args.join(","), kwargs.join(","))
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

/// Short-lived memoization of call results.
///
/// Expiry is lazy: an entry is checked on `get` and removed by the lookup
/// that finds it stale. Every `get` counts exactly one hit or miss; a
/// disabled cache always misses and stores nothing. Concurrent misses on the
/// same key are not collapsed, each caller fetches.
pub struct TtlCache<V> {
    enabled: bool,
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
    stats: Arc<CacheStats>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration, enabled: bool) -> Self {
        Self::with_stats(ttl, enabled, Arc::new(CacheStats::new()))
    }

    pub fn with_stats(ttl: Duration, enabled: bool, stats: Arc<CacheStats>) -> Self {
        Self {
            enabled,
            ttl,
            entries: Mutex::new(HashMap::new()),
            stats,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn stats(&self) -> &Arc<CacheStats> {
        &self.stats
    }

    pub async fn get(&self, key: &str) -> Option<V> {
        if !self.enabled {
            self.stats.record_miss();
            return None;
        }

        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let value = match entries.get(key).map(|entry| now <= entry.expires_at) {
            Some(true) => entries.get(key).map(|entry| entry.value.clone()),
            Some(false) => {
                entries.remove(key);
                None
            }
            None => None,
        };

        match value {
            Some(value) => {
                self.stats.record_hit();
                trace!(key, "Cache hit");
                Some(value)
            }
            None => {
                self.stats.record_miss();
                trace!(key, "Cache miss");
                None
            }
        }
    }

    /// Store `value`, replacing any entry for `key` and restarting its TTL.
    pub async fn set(&self, key: impl Into<String>, value: V) {
        if !self.enabled {
            return;
        }
        let expires_at = Instant::now() + self.ttl;
        self.entries
            .lock()
            .await
            .insert(key.into(), CacheEntry { value, expires_at });
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    /// Entries currently stored, stale ones included until looked up.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Return the cached value for `key`, or run `fetch` and cache its result.
    /// Errors are returned as-is and never cached.
    pub async fn get_or_fetch<F, Fut>(&self, key: String, fetch: F) -> Result<V, MarketDataError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, MarketDataError>>,
    {
        if let Some(value) = self.get(&key).await {
            return Ok(value);
        }
        let value = fetch().await?;
        self.set(key, value.clone()).await;
        Ok(value)
    }
}
