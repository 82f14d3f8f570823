//! Tile result cache.
//!
//! Two policies are provided: [`NoopTileCache`] (never stores) and
//! [`LruTileCache`] (bounded, least recently used eviction). Both implement
//! [`TileCache`], which the tile service calls before and after rendering.

mod lru;
mod noop;
mod traits;

pub use lru::{LruTileCache, DEFAULT_CAPACITY};
pub use noop::NoopTileCache;
pub use traits::{CachePolicy, CacheStats, CachedTile, TileCache, TileCacheError};

use std::sync::Arc;

use tracing::info;

/// Creates the cache for a policy.
///
/// # Errors
///
/// Returns `TileCacheError::InvalidCapacity` for an LRU cache of capacity 0.
pub fn create_tile_cache(
    policy: CachePolicy,
    capacity: usize,
) -> Result<Arc<dyn TileCache>, TileCacheError> {
    let cache: Arc<dyn TileCache> = match policy {
        CachePolicy::None => Arc::new(NoopTileCache::new()),
        CachePolicy::Lru => Arc::new(LruTileCache::new(capacity)?),
    };
    info!(policy = %policy, capacity, "Tile cache created");
    Ok(cache)
}
