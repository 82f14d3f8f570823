//! Pool keys.
//!
//! A key is the deterministic serialization of everything that shapes a
//! renderer: the map configuration id, the cache buster and the request
//! parameters. Tile coordinates are stripped so that every tile of the same
//! configuration shares one pool.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// Parameters that address a tile rather than configure a renderer.
pub const COORDINATE_PARAMS: [&str; 3] = ["x", "y", "z"];

#[derive(Serialize)]
struct KeyParts<'a> {
    map: &'a str,
    cache_buster: &'a str,
    params: BTreeMap<&'a str, &'a str>,
}

/// Identity of a keyed renderer pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolKey {
    map_id: String,
    serialized: String,
}

impl PoolKey {
    /// Builds a key from renderer options, ignoring `x`, `y` and `z`.
    pub fn new(map_id: &str, cache_buster: &str, params: &BTreeMap<String, String>) -> Self {
        let params = params
            .iter()
            .filter(|(k, _)| !COORDINATE_PARAMS.contains(&k.as_str()))
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        let parts = KeyParts {
            map: map_id,
            cache_buster,
            params,
        };

        // Serializing string maps cannot fail
        let serialized = serde_json::to_string(&parts).unwrap_or_default();

        Self {
            map_id: map_id.to_string(),
            serialized,
        }
    }

    /// Id of the map configuration the pooled renderers were built from.
    pub fn map_id(&self) -> &str {
        &self.map_id
    }

    pub fn as_str(&self) -> &str {
        &self.serialized
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialized)
    }
}
