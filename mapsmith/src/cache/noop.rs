//! Cache that never stores anything.

use std::sync::atomic::{AtomicU64, Ordering};

use super::traits::{CachePolicy, CacheStats, CachedTile, TileCache};
use crate::BoxFuture;

#[derive(Debug, Default)]
pub struct NoopTileCache {
    misses: AtomicU64,
}

impl NoopTileCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TileCache for NoopTileCache {
    fn before<'a>(&'a self, _identity: &'a str) -> BoxFuture<'a, Option<CachedTile>> {
        self.misses.fetch_add(1, Ordering::Relaxed);
        Box::pin(async { None })
    }

    fn after<'a>(&'a self, _identity: &'a str, _tile: CachedTile) -> BoxFuture<'a, ()> {
        Box::pin(async {})
    }

    fn policy(&self) -> CachePolicy {
        CachePolicy::None
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            misses: self.misses.load(Ordering::Relaxed),
            ..CacheStats::default()
        }
    }
}
