//! INI serialization logic for converting `ConfigFile` → INI string.

use super::settings::ConfigFile;

/// Convert a `ConfigFile` to a commented INI string.
pub(super) fn to_config_string(config: &ConfigFile) -> String {
    let concurrency = config
        .render
        .concurrency
        .map(|n| n.to_string())
        .unwrap_or_else(|| "auto".to_string());

    format!(
        r#"[pool]
; Maximum renderers per configuration key
max_per_key = {}
; Seconds a renderer may sit unused before the reaper closes it
idle_timeout_secs = {}
; Seconds between reaper passes
reap_interval_secs = {}
; Milliseconds to wait for a renderer before failing (0 = fail immediately)
acquire_timeout_ms = {}

[cache]
; Tile cache policy: lru or none
policy = {}
; Maximum cached tiles (lru only)
capacity = {}

[render]
; Tile edge in pixels
tile_size = {}
; Composite workers: auto (CPU count) or a positive integer
concurrency = {}

[sql]
; Statement timeout for widget queries in milliseconds (0 = disabled)
query_timeout_ms = {}

[http]
; Timeout for http layer fetches in seconds
timeout_secs = {}
; Comma-separated URL prefixes allowed for http layers (empty = all)
url_whitelist = {}
"#,
        config.pool.max_per_key,
        config.pool.idle_timeout_secs,
        config.pool.reap_interval_secs,
        config.pool.acquire_timeout_ms,
        config.cache.policy,
        config.cache.capacity,
        config.render.tile_size,
        concurrency,
        config.sql.query_timeout_ms,
        config.http.timeout_secs,
        config.http.url_whitelist.join(", "),
    )
}
