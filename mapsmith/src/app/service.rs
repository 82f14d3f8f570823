//! Tile request pipeline: cache lookup, renderer checkout, render, store.

use std::fmt::Write as _;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::cache::{CacheStats, CachedTile, TileCache};
use crate::coord::TileCoord;
use crate::error::Result;
use crate::mapconfig::{MapConfigProvider, RequestParams};
use crate::pool::{PoolStats, COORDINATE_PARAMS};
use crate::renderer::{RendererFactory, RendererOptions, Tile, TileFormat};

/// Builds the cache identity of a tile request: its path plus the sorted
/// query string.
///
/// Coordinates and the format live in the path, so they are left out of the
/// query part.
pub fn tile_identity(
    map_id: &str,
    cache_buster: &str,
    coord: TileCoord,
    format: TileFormat,
    params: &RequestParams,
) -> String {
    let mut identity = format!(
        "/{}:{}/{}/{}/{}.{}",
        map_id, cache_buster, coord.z, coord.x, coord.y, format
    );

    let mut separator = '?';
    for (key, value) in params {
        if COORDINATE_PARAMS.contains(&key.as_str()) || key == "format" {
            continue;
        }
        let _ = write!(identity, "{}{}={}", separator, key, value);
        separator = '&';
    }
    identity
}

/// Aggregated counters of the tile service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ServiceStats {
    pub pools: usize,
    pub pool: PoolStats,
    pub cache: CacheStats,
}

/// Serves tiles for map configurations resolved by a [`MapConfigProvider`].
#[derive(Clone)]
pub struct TileService {
    factory: Arc<RendererFactory>,
    cache: Arc<dyn TileCache>,
}

impl TileService {
    pub fn new(factory: Arc<RendererFactory>, cache: Arc<dyn TileCache>) -> Self {
        Self { factory, cache }
    }

    pub fn factory(&self) -> &Arc<RendererFactory> {
        &self.factory
    }

    pub fn cache(&self) -> &Arc<dyn TileCache> {
        &self.cache
    }

    /// Renders one tile.
    ///
    /// A cache hit is returned without touching the renderer pool. Failed
    /// renders are never cached.
    ///
    /// # Errors
    ///
    /// - `MapError::Validation` for out-of-range coordinates or a bad layer list
    /// - `MapError::Config` for an unknown or unsupported format
    /// - any error raised while acquiring a renderer or rendering
    #[instrument(skip(self, provider), fields(identity = tracing::field::Empty))]
    pub async fn get_tile(
        &self,
        provider: &dyn MapConfigProvider,
        z: u8,
        x: u32,
        y: u32,
    ) -> Result<Tile> {
        let coord = TileCoord::new(z, x, y)?;
        let resolved = provider.get_map_config().await?;
        let options = RendererOptions::from_params(&resolved.params)?;

        let identity = tile_identity(
            resolved.config.id(),
            &provider.get_cache_buster(),
            coord,
            options.format,
            &resolved.params,
        );
        tracing::Span::current().record("identity", identity.as_str());

        if let Some(hit) = self.cache.before(&identity).await {
            debug!("Tile cache hit");
            return Ok(Tile {
                buffer: hit.buffer,
                headers: hit.headers,
                stats: Default::default(),
            });
        }

        let mut params = resolved.params.clone();
        options.apply_to(&mut params);
        let key = provider.create_key(&params);

        let lease = self
            .factory
            .get_renderer(&resolved.config, &key, &options)
            .await?;
        let tile = lease.get_tile(coord.z, coord.x, coord.y).await?;
        lease.release();

        self.cache
            .after(
                &identity,
                CachedTile {
                    buffer: tile.buffer.clone(),
                    headers: tile.headers.clone(),
                },
            )
            .await;

        Ok(tile)
    }

    /// Metadata of the renderer serving the provider's request shape.
    pub async fn get_metadata(&self, provider: &dyn MapConfigProvider) -> Result<Value> {
        let resolved = provider.get_map_config().await?;
        let options = RendererOptions::from_params(&resolved.params)?;
        let mut params = resolved.params.clone();
        options.apply_to(&mut params);
        let key = provider.create_key(&params);

        let lease = self
            .factory
            .get_renderer(&resolved.config, &key, &options)
            .await?;
        lease.get_metadata().await
    }

    /// Destroys every pooled renderer built for the provider's map, e.g.
    /// after its style changed. Returns the number of pools dropped.
    pub fn reset(&self, provider: &dyn MapConfigProvider) -> usize {
        self.factory.pool().reset(|key| provider.filter(key))
    }

    pub fn stats(&self) -> ServiceStats {
        let pool = self.factory.pool();
        ServiceStats {
            pools: pool.pool_count(),
            pool: pool.total_stats(),
            cache: self.cache.stats(),
        }
    }
}
