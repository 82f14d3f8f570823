//! Map configuration provider seam.
//!
//! Request handling lives outside this crate. Whatever resolves a request to
//! a stored map configuration implements [`MapConfigProvider`]; the tile
//! service only ever talks to this trait.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use super::MapConfig;
use crate::error::Result;
use crate::pool::PoolKey;
use crate::BoxFuture;

/// Request parameters (format, layer selection, token, ...).
pub type RequestParams = BTreeMap<String, String>;

/// A configuration resolved for one request.
#[derive(Debug, Clone)]
pub struct ResolvedMapConfig {
    pub config: Arc<MapConfig>,
    pub params: RequestParams,
    /// Opaque request context (user, api key scope, ...).
    pub context: BTreeMap<String, Value>,
}

/// Resolves the map configuration for a request.
pub trait MapConfigProvider: Send + Sync {
    fn get_map_config(&self) -> BoxFuture<'_, Result<ResolvedMapConfig>>;

    /// Stable key identifying the configuration and request shape.
    fn get_key(&self) -> String;

    /// Token that changes whenever the underlying data or style changes.
    fn get_cache_buster(&self) -> String;

    /// True when a pooled renderer key belongs to this provider's map.
    fn filter(&self, key: &PoolKey) -> bool;

    /// Pool key for renderers built from this provider's configuration.
    fn create_key(&self, params: &RequestParams) -> PoolKey;
}

/// Provider over an in-memory configuration.
pub struct StaticMapConfigProvider {
    config: Arc<MapConfig>,
    params: RequestParams,
    cache_buster: String,
}

impl StaticMapConfigProvider {
    pub fn new(config: Arc<MapConfig>, params: RequestParams) -> Self {
        Self {
            config,
            params,
            cache_buster: "0".to_string(),
        }
    }

    pub fn with_cache_buster(mut self, cache_buster: impl Into<String>) -> Self {
        self.cache_buster = cache_buster.into();
        self
    }

    pub fn config(&self) -> &Arc<MapConfig> {
        &self.config
    }
}

impl MapConfigProvider for StaticMapConfigProvider {
    fn get_map_config(&self) -> BoxFuture<'_, Result<ResolvedMapConfig>> {
        Box::pin(async move {
            Ok(ResolvedMapConfig {
                config: Arc::clone(&self.config),
                params: self.params.clone(),
                context: BTreeMap::new(),
            })
        })
    }

    fn get_key(&self) -> String {
        let key = self.create_key(&self.params);
        key.as_str().to_string()
    }

    fn get_cache_buster(&self) -> String {
        self.cache_buster.clone()
    }

    fn filter(&self, key: &PoolKey) -> bool {
        key.map_id() == self.config.id()
    }

    fn create_key(&self, params: &RequestParams) -> PoolKey {
        PoolKey::new(self.config.id(), &self.cache_buster, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapconfig::Layer;

    fn params(pairs: &[(&str, &str)]) -> RequestParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_static_provider_resolves_config() {
        let config = Arc::new(MapConfig::from_layers(vec![Layer::plain("#ff0000")]).unwrap());
        let provider = StaticMapConfigProvider::new(Arc::clone(&config), params(&[("format", "png")]));

        let resolved = provider.get_map_config().await.unwrap();
        assert_eq!(resolved.config.id(), config.id());
        assert_eq!(resolved.params.get("format").map(String::as_str), Some("png"));
    }

    #[test]
    fn test_keys_ignore_tile_coordinates() {
        let config = Arc::new(MapConfig::from_layers(vec![Layer::plain("#ff0000")]).unwrap());
        let provider = StaticMapConfigProvider::new(config, RequestParams::new());

        let a = provider.create_key(&params(&[("format", "png"), ("z", "1"), ("x", "0"), ("y", "0")]));
        let b = provider.create_key(&params(&[("format", "png"), ("z", "4"), ("x", "3"), ("y", "9")]));
        assert_eq!(a, b);
        assert!(provider.filter(&a));
    }

    #[test]
    fn test_cache_buster_changes_key() {
        let config = Arc::new(MapConfig::from_layers(vec![Layer::plain("#ff0000")]).unwrap());
        let a = StaticMapConfigProvider::new(Arc::clone(&config), RequestParams::new());
        let b = StaticMapConfigProvider::new(config, RequestParams::new()).with_cache_buster("42");
        assert_ne!(a.get_key(), b.get_key());
        assert_eq!(b.get_cache_buster(), "42");
    }
}
