//! Settings structs and their defaults.

use crate::cache::CachePolicy;
use crate::coord::TILE_SIZE;
use crate::pool;
use crate::renderer::DEFAULT_HTTP_TIMEOUT;

pub const DEFAULT_MAX_PER_KEY: usize = pool::DEFAULT_MAX_PER_KEY;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = pool::DEFAULT_IDLE_TIMEOUT.as_secs();
pub const DEFAULT_REAP_INTERVAL_SECS: u64 = pool::DEFAULT_REAP_INTERVAL.as_secs();
pub const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = pool::DEFAULT_ACQUIRE_TIMEOUT.as_millis() as u64;
pub const DEFAULT_CACHE_CAPACITY: usize = crate::cache::DEFAULT_CAPACITY;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = DEFAULT_HTTP_TIMEOUT.as_secs();

/// Full configuration file contents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    pub pool: PoolSettings,
    pub cache: CacheSettings,
    pub render: RenderSettings,
    pub sql: SqlSettings,
    pub http: HttpSettings,
}

/// `[pool]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolSettings {
    pub max_per_key: usize,
    pub idle_timeout_secs: u64,
    pub reap_interval_secs: u64,
    pub acquire_timeout_ms: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_per_key: DEFAULT_MAX_PER_KEY,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            reap_interval_secs: DEFAULT_REAP_INTERVAL_SECS,
            acquire_timeout_ms: DEFAULT_ACQUIRE_TIMEOUT_MS,
        }
    }
}

/// `[cache]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSettings {
    pub policy: CachePolicy,
    pub capacity: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            policy: CachePolicy::Lru,
            capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

/// `[render]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSettings {
    pub tile_size: u32,
    /// Composite workers. `None` uses the CPU count.
    pub concurrency: Option<usize>,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            tile_size: TILE_SIZE,
            concurrency: None,
        }
    }
}

/// `[sql]` section.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlSettings {
    /// Statement timeout handed to the executor. 0 disables it.
    pub query_timeout_ms: u64,
}

/// `[http]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    /// Allowed URL prefixes for http layers. Empty allows everything.
    pub url_whitelist: Vec<String>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            url_whitelist: Vec::new(),
        }
    }
}
