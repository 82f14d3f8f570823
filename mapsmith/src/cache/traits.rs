//! Core traits for tile result caching.
//!
//! A [`TileCache`] brackets the render pipeline: `before` runs first and a
//! hit short-circuits rendering; `after` runs once a tile has been produced.
//! Keys are the full request identity (path plus query string), so two
//! requests only share an entry when they would render the same bytes.
//!
//! The trait uses boxed futures so external caches (a CDN surrogate store, a
//! shared key-value service) can be plugged in as `Arc<dyn TileCache>`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

use crate::BoxFuture;

/// Errors raised while configuring a tile cache.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TileCacheError {
    #[error("Unknown cache policy '{0}', expected 'lru' or 'none'")]
    UnknownPolicy(String),

    #[error("Cache capacity must be positive")]
    InvalidCapacity,
}

/// A cached tile response.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedTile {
    pub buffer: Bytes,
    pub headers: BTreeMap<String, String>,
}

/// Eviction policy of a tile cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// No caching; every lookup misses.
    None,
    /// Bounded least-recently-used cache.
    #[default]
    Lru,
}

impl fmt::Display for CachePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Lru => "lru",
        })
    }
}

impl FromStr for CachePolicy {
    type Err = TileCacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "noop" | "off" => Ok(Self::None),
            "lru" => Ok(Self::Lru),
            other => Err(TileCacheError::UnknownPolicy(other.to_string())),
        }
    }
}

/// Cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Before/after hooks around the tile pipeline.
pub trait TileCache: Send + Sync {
    /// Looks up a request identity. `Some` short-circuits rendering.
    fn before<'a>(&'a self, identity: &'a str) -> BoxFuture<'a, Option<CachedTile>>;

    /// Stores a freshly rendered tile.
    fn after<'a>(&'a self, identity: &'a str, tile: CachedTile) -> BoxFuture<'a, ()>;

    fn policy(&self) -> CachePolicy;

    fn stats(&self) -> CacheStats;
}
