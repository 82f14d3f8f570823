//! Application configuration for [`MapsmithApp`](super::MapsmithApp).

use std::time::Duration;

use crate::cache::CachePolicy;
use crate::config::{ConfigFile, DEFAULT_CACHE_CAPACITY};
use crate::coord::TILE_SIZE;
use crate::pool::PoolConfig;
use crate::renderer::DEFAULT_HTTP_TIMEOUT;

/// Top-level configuration passed to `MapsmithApp::start()`.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub pool: PoolConfig,
    pub cache_policy: CachePolicy,
    pub cache_capacity: usize,
    pub tile_size: u32,
    /// Composite workers. `None` uses the CPU count.
    pub render_concurrency: Option<usize>,
    /// Statement timeout for widget queries.
    pub query_timeout: Option<Duration>,
    pub http_timeout: Duration,
    pub url_whitelist: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            cache_policy: CachePolicy::Lru,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            tile_size: TILE_SIZE,
            render_concurrency: None,
            query_timeout: None,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            url_whitelist: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Create application config from the configuration file.
    ///
    /// This keeps the translation from INI settings to component configs in
    /// one place rather than scattered in CLI code.
    pub fn from_config_file(config: &ConfigFile) -> Self {
        let query_timeout = match config.sql.query_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };

        Self {
            pool: PoolConfig {
                max_per_key: config.pool.max_per_key,
                idle_timeout: Duration::from_secs(config.pool.idle_timeout_secs),
                reap_interval: Duration::from_secs(config.pool.reap_interval_secs),
                acquire_timeout: Duration::from_millis(config.pool.acquire_timeout_ms),
            },
            cache_policy: config.cache.policy,
            cache_capacity: config.cache.capacity,
            tile_size: config.render.tile_size,
            render_concurrency: config.render.concurrency,
            query_timeout,
            http_timeout: Duration::from_secs(config.http.timeout_secs),
            url_whitelist: config.http.url_whitelist.clone(),
        }
    }

    /// Set the tile cache policy and capacity.
    pub fn with_cache(mut self, policy: CachePolicy, capacity: usize) -> Self {
        self.cache_policy = policy;
        self.cache_capacity = capacity;
        self
    }

    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }
}
