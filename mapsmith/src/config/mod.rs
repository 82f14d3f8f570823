//! Configuration file support.
//!
//! Settings live in an INI file at `~/.mapsmith/config.ini`. Every key is
//! optional; absent keys and a missing file fall back to the defaults in
//! [`settings`].

mod file;
mod parser;
mod settings;
mod writer;

pub use file::{config_directory, config_file_path, ConfigFile, ConfigFileError};
pub use settings::{
    CacheSettings, HttpSettings, PoolSettings, RenderSettings, SqlSettings,
    DEFAULT_ACQUIRE_TIMEOUT_MS, DEFAULT_CACHE_CAPACITY, DEFAULT_HTTP_TIMEOUT_SECS,
    DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_MAX_PER_KEY, DEFAULT_REAP_INTERVAL_SECS,
};
