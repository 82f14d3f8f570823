//! Bounded least-recently-used tile cache backed by moka.
//!
//! `moka::future::Cache` is lock-free on reads and safe to share across
//! tasks, so the tile service can hit it from every request without a
//! global lock. The cache runs with the LRU eviction policy (every new
//! entry is admitted, the least recently used one leaves) and pending
//! maintenance is flushed after each insert so the capacity bound holds
//! exactly once `after` returns.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use moka::future::Cache;
use moka::notification::RemovalCause;
use moka::policy::EvictionPolicy;
use tracing::trace;

use super::traits::{CachePolicy, CacheStats, CachedTile, TileCache, TileCacheError};
use crate::BoxFuture;

/// Default number of tiles held by an LRU cache.
pub const DEFAULT_CAPACITY: usize = 1024;

pub struct LruTileCache {
    cache: Cache<String, CachedTile>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    /// Shared with the eviction listener.
    evictions: Arc<AtomicU64>,
}

impl LruTileCache {
    /// # Errors
    ///
    /// Returns `TileCacheError::InvalidCapacity` for a zero capacity.
    pub fn new(capacity: usize) -> Result<Self, TileCacheError> {
        if capacity == 0 {
            return Err(TileCacheError::InvalidCapacity);
        }

        let evictions = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&evictions);

        let cache = Cache::builder()
            .max_capacity(capacity as u64)
            .eviction_policy(EvictionPolicy::lru())
            .eviction_listener(move |key: Arc<String>, _tile, cause| {
                if matches!(cause, RemovalCause::Size) {
                    counter.fetch_add(1, Ordering::Relaxed);
                    trace!(key = %key, "Evicted LRU tile");
                }
            })
            .build();

        Ok(Self {
            cache,
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.cache.entry_count() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the entry and marks it most recently used.
    pub async fn get(&self, key: &str) -> Option<CachedTile> {
        match self.cache.get(key).await {
            Some(tile) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(tile)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Inserts or replaces an entry, evicting the least recently used entry
    /// when over capacity.
    pub async fn put(&self, key: &str, tile: CachedTile) {
        self.cache.insert(key.to_string(), tile).await;
        // Apply recorded reads and run eviction now rather than lazily
        self.cache.run_pending_tasks().await;
    }

    pub fn contains(&self, key: &str) -> bool {
        self.cache.contains_key(key)
    }
}

impl TileCache for LruTileCache {
    fn before<'a>(&'a self, identity: &'a str) -> BoxFuture<'a, Option<CachedTile>> {
        Box::pin(self.get(identity))
    }

    fn after<'a>(&'a self, identity: &'a str, tile: CachedTile) -> BoxFuture<'a, ()> {
        Box::pin(self.put(identity, tile))
    }

    fn policy(&self) -> CachePolicy {
        CachePolicy::Lru
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::collections::BTreeMap;

    fn tile(body: &'static [u8]) -> CachedTile {
        CachedTile {
            buffer: Bytes::from_static(body),
            headers: BTreeMap::new(),
        }
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(LruTileCache::new(0), Err(TileCacheError::InvalidCapacity)));
    }

    #[tokio::test]
    async fn test_put_over_capacity_evicts_exactly_lru() {
        let cache = LruTileCache::new(2).unwrap();
        cache.put("a", tile(b"a")).await;
        cache.put("b", tile(b"b")).await;
        assert_eq!(cache.stats().evictions, 0);

        cache.put("c", tile(b"c")).await;
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains("a"));
        assert!(cache.contains("b") && cache.contains("c"));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[tokio::test]
    async fn test_get_promotes() {
        let cache = LruTileCache::new(2).unwrap();
        cache.put("a", tile(b"a")).await;
        cache.put("b", tile(b"b")).await;
        assert!(cache.get("a").await.is_some());

        cache.put("c", tile(b"c")).await;
        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
    }

    #[tokio::test]
    async fn test_replacing_does_not_evict() {
        let cache = LruTileCache::new(2).unwrap();
        cache.put("a", tile(b"a1")).await;
        cache.put("b", tile(b"b")).await;
        cache.put("a", tile(b"a2")).await;
        assert_eq!(cache.stats().evictions, 0);
        assert_eq!(cache.get("a").await.unwrap().buffer, Bytes::from_static(b"a2"));

        // "b" is now the least recently used
        cache.put("c", tile(b"c")).await;
        assert!(!cache.contains("b"));
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_hooks_and_stats() {
        let cache = LruTileCache::new(4).unwrap();
        assert!(cache.before("/1/0/0.png").await.is_none());

        cache.after("/1/0/0.png", tile(b"png")).await;
        let hit = cache.before("/1/0/0.png").await.unwrap();
        assert_eq!(&hit.buffer[..], b"png");

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));
        assert_eq!(stats.hit_rate(), 0.5);
    }
}
