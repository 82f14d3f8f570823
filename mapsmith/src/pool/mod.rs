//! Keyed renderer pool.
//!
//! Renderers are expensive to build (style compilation, native renderer
//! setup), so they are cached per [`PoolKey`] and shared across tile
//! requests of the same configuration. A [`PoolReaper`] task destroys those
//! left idle.

mod key;
mod manager;
mod reaper;

pub use key::{PoolKey, COORDINATE_PARAMS};
pub use manager::{
    KeyedPool, PoolConfig, PoolManager, PoolStats, Poolable, Pooled, DEFAULT_ACQUIRE_TIMEOUT,
    DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_PER_KEY, DEFAULT_REAP_INTERVAL,
};
pub use reaper::PoolReaper;
