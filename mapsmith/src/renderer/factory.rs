//! Renderer factory.
//!
//! Resolves a map configuration and request options into a pooled renderer:
//! selects the contributing layers, validates format support, groups
//! consecutive raster-style layers, and builds one renderer per group
//! (blended when there is more than one). All validation happens before any
//! backend is touched.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, instrument};

use super::backend::{RenderGroup, RendererBackend};
use super::blend::{BlendLayer, BlendRenderer};
use super::format::{supports, TileFormat};
use super::limiter::RenderLimiter;
use super::options::{LayerSelection, RendererOptions};
use super::{RendererHandle, RendererStats, Tile};
use crate::coord::TILE_SIZE;
use crate::error::{MapError, Result};
use crate::mapconfig::{LayerType, MapConfig};
use crate::pool::{PoolKey, PoolManager, Pooled};

/// Default number of layer renders run concurrently for one blended tile.
pub const DEFAULT_BLEND_FANOUT: usize = 8;

/// A pooled renderer checked out for one request.
///
/// Dropping the lease returns the renderer to its pool.
pub struct RendererLease {
    inner: Pooled<dyn RendererHandle>,
}

impl RendererLease {
    pub async fn get_tile(&self, z: u8, x: u32, y: u32) -> Result<Tile> {
        self.inner.get_tile(z, x, y).await
    }

    pub async fn get_metadata(&self) -> Result<Value> {
        self.inner.get_metadata().await
    }

    /// Renderer stats with the pool counters of its key filled in.
    pub fn get_stats(&self) -> RendererStats {
        let mut stats = self.inner.get_stats();
        stats.pool = self.inner.pool_stats();
        stats
    }

    pub fn key(&self) -> &PoolKey {
        self.inner.key()
    }

    pub fn renderer(&self) -> &Arc<dyn RendererHandle> {
        self.inner.resource()
    }

    pub fn release(self) {
        self.inner.release();
    }
}

/// Builds renderers by layer family and caches them in the pool.
pub struct RendererFactory {
    backends: HashMap<LayerType, Arc<dyn RendererBackend>>,
    pool: Arc<PoolManager<dyn RendererHandle>>,
    limiter: Arc<RenderLimiter>,
    tile_size: u32,
    fanout: usize,
}

impl RendererFactory {
    pub fn new(pool: Arc<PoolManager<dyn RendererHandle>>, limiter: Arc<RenderLimiter>) -> Self {
        Self {
            backends: HashMap::new(),
            pool,
            limiter,
            tile_size: TILE_SIZE,
            fanout: DEFAULT_BLEND_FANOUT,
        }
    }

    pub fn with_backend(mut self, backend: Arc<dyn RendererBackend>) -> Self {
        self.register(backend);
        self
    }

    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size;
        self
    }

    pub fn with_fanout(mut self, fanout: usize) -> Self {
        self.fanout = fanout.max(1);
        self
    }

    /// Registers a backend, replacing any previous one for its family.
    pub fn register(&mut self, backend: Arc<dyn RendererBackend>) {
        self.backends.insert(backend.family(), backend);
    }

    pub fn families(&self) -> Vec<LayerType> {
        let mut families: Vec<_> = self.backends.keys().copied().collect();
        families.sort();
        families
    }

    pub fn pool(&self) -> &Arc<PoolManager<dyn RendererHandle>> {
        &self.pool
    }

    /// Selects and groups the layers contributing to a request.
    ///
    /// # Errors
    ///
    /// - `MapError::NotFound` for an explicitly selected layer that does not exist
    /// - `MapError::Config` when a selected layer cannot produce the format,
    ///   no layer can, a family has no backend, or several groups would
    ///   have to blend a non-image format
    pub fn plan(&self, config: &MapConfig, options: &RendererOptions) -> Result<Vec<RenderGroup>> {
        let format = options.format;

        let selected: Vec<usize> = match &options.layers {
            LayerSelection::All => {
                let selected: Vec<usize> = config
                    .layers()
                    .iter()
                    .enumerate()
                    .filter(|(_, layer)| supports(layer.layer_type, format))
                    .map(|(i, _)| i)
                    .collect();
                if selected.is_empty() {
                    return Err(MapError::Config(format!(
                        "No layer in the map configuration supports format '{}'",
                        format
                    )));
                }
                selected
            }
            LayerSelection::Indices(indices) => {
                for &i in indices {
                    let layer_type = config.layer_type(i)?;
                    if !supports(layer_type, format) {
                        return Err(MapError::Config(format!(
                            "Unsupported format '{}' for layer {} of type '{}'",
                            format, i, layer_type
                        )));
                    }
                }
                if indices.is_empty() {
                    return Err(MapError::Config("Empty layer selection".into()));
                }
                indices.clone()
            }
        };

        let mut groups: Vec<RenderGroup> = Vec::new();
        let mut previous: Option<usize> = None;
        for i in selected {
            let layer = config.layer(i)?;
            let family = layer.layer_type;
            if !self.backends.contains_key(&family) {
                return Err(MapError::Config(format!(
                    "No renderer backend registered for layer type '{}'",
                    family
                )));
            }

            let extends_group = family == LayerType::RasterStyle
                && previous.map(|p| p + 1) == Some(i)
                && groups.last().map(|g| g.family) == Some(LayerType::RasterStyle);

            match groups.last_mut() {
                Some(group) if extends_group => group.layers.push((i, layer.clone())),
                _ => {
                    let mut group = RenderGroup::new(family);
                    group.layers.push((i, layer.clone()));
                    groups.push(group);
                }
            }
            previous = Some(i);
        }

        if groups.len() > 1 && !format.is_blendable() {
            return Err(MapError::Config(format!(
                "Format '{}' cannot combine {} layer groups",
                format,
                groups.len()
            )));
        }

        Ok(groups)
    }

    /// Checks out a renderer for `config` and `options`, building one on a
    /// pool miss.
    #[instrument(skip(self, config), fields(map = %config.id(), format = %options.format))]
    pub async fn get_renderer(
        &self,
        config: &MapConfig,
        key: &PoolKey,
        options: &RendererOptions,
    ) -> Result<RendererLease> {
        let groups = self.plan(config, options)?;
        let format = options.format;

        let inner = self
            .pool
            .acquire(key, || self.build(&groups, format))
            .await?;
        Ok(RendererLease { inner })
    }

    async fn build(
        &self,
        groups: &[RenderGroup],
        format: TileFormat,
    ) -> Result<Arc<dyn RendererHandle>> {
        if let [group] = groups {
            return self.backend(group.family)?.create(group, format).await;
        }

        let created = join_all(groups.iter().map(|group| async move {
            self.backend(group.family)?.create(group, format).await
        }))
        .await;

        let mut layers = Vec::with_capacity(groups.len());
        let mut failure = None;
        for (group, result) in groups.iter().zip(created) {
            match result {
                Ok(renderer) => layers.push(BlendLayer {
                    index: group.first_index(),
                    family: group.family,
                    renderer,
                }),
                Err(e) if failure.is_none() => failure = Some(e),
                Err(_) => {}
            }
        }

        if let Some(e) = failure {
            for layer in &layers {
                layer.renderer.close();
            }
            return Err(e);
        }

        debug!(groups = layers.len(), format = %format, "Created blend renderer");
        Ok(Arc::new(BlendRenderer::new(
            layers,
            format,
            self.tile_size,
            self.fanout,
            Arc::clone(&self.limiter),
        )))
    }

    fn backend(&self, family: LayerType) -> Result<&Arc<dyn RendererBackend>> {
        self.backends.get(&family).ok_or_else(|| {
            MapError::Config(format!("No renderer backend registered for layer type '{}'", family))
        })
    }
}
