//! INI parsing logic for converting `Ini` → `ConfigFile`.
//!
//! This is the single place where INI key names are mapped to struct fields.

use std::str::FromStr;

use ini::{Ini, Properties};

use super::file::ConfigFileError;
use super::settings::ConfigFile;
use crate::cache::CachePolicy;

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    // [pool] section
    if let Some(section) = ini.section(Some("pool")) {
        if let Some(v) = positive(section, "pool", "max_per_key")? {
            config.pool.max_per_key = v;
        }
        if let Some(v) = positive(section, "pool", "idle_timeout_secs")? {
            config.pool.idle_timeout_secs = v;
        }
        if let Some(v) = positive(section, "pool", "reap_interval_secs")? {
            config.pool.reap_interval_secs = v;
        }
        if let Some(v) = number(section, "pool", "acquire_timeout_ms", "must be an integer (milliseconds)")? {
            config.pool.acquire_timeout_ms = v;
        }
    }

    // [cache] section
    if let Some(section) = ini.section(Some("cache")) {
        if let Some(v) = section.get("policy") {
            config.cache.policy = CachePolicy::from_str(v).map_err(|_| invalid(
                "cache",
                "policy",
                v,
                "must be 'lru' or 'none'",
            ))?;
        }
        if let Some(v) = positive(section, "cache", "capacity")? {
            config.cache.capacity = v;
        }
    }

    // [render] section
    if let Some(section) = ini.section(Some("render")) {
        if let Some(v) = positive(section, "render", "tile_size")? {
            config.render.tile_size = v;
        }
        if let Some(v) = section.get("concurrency") {
            let v = v.trim();
            if !v.is_empty() && !v.eq_ignore_ascii_case("auto") {
                let n: usize = v
                    .parse()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| invalid("render", "concurrency", v, "must be 'auto' or a positive integer"))?;
                config.render.concurrency = Some(n);
            }
        }
    }

    // [sql] section
    if let Some(section) = ini.section(Some("sql")) {
        if let Some(v) = number(section, "sql", "query_timeout_ms", "must be an integer (milliseconds, 0 disables)")? {
            config.sql.query_timeout_ms = v;
        }
    }

    // [http] section
    if let Some(section) = ini.section(Some("http")) {
        if let Some(v) = positive(section, "http", "timeout_secs")? {
            config.http.timeout_secs = v;
        }
        if let Some(v) = section.get("url_whitelist") {
            config.http.url_whitelist = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
    }

    Ok(config)
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn number<T: FromStr>(
    section: &Properties,
    name: &str,
    key: &str,
    reason: &str,
) -> Result<Option<T>, ConfigFileError> {
    match section.get(key) {
        None => Ok(None),
        Some(v) => v
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| invalid(name, key, v, reason)),
    }
}

fn positive<T: FromStr + PartialOrd + Default>(
    section: &Properties,
    name: &str,
    key: &str,
) -> Result<Option<T>, ConfigFileError> {
    let reason = "must be a positive integer";
    match number::<T>(section, name, key, reason)? {
        Some(v) if v <= T::default() => Err(invalid(name, key, section.get(key).unwrap_or(""), reason)),
        other => Ok(other),
    }
}
