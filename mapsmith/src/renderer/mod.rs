//! Tile renderers.
//!
//! A renderer turns a tile address into an encoded tile for one map
//! configuration and format. Renderers come from [`RendererBackend`]s, one
//! per layer family, and are cached in the keyed [`crate::pool`]. When more
//! than one renderer contributes to a tile, a [`BlendRenderer`] fans the
//! request out and composites the results.
//!
//! ```text
//! RendererFactory::get_renderer(config, options)
//!   ├── plan: select layers, check formats, group consecutive raster layers
//!   └── pool.acquire(key)
//!         └── on miss: backend.create(group) per group
//!               └── BlendRenderer when more than one group
//! ```

mod backend;
mod blend;
mod factory;
mod format;
mod http;
mod limiter;
mod options;
mod plain;
mod style;

pub use backend::{RenderGroup, RendererBackend};
pub use blend::BlendRenderer;
pub use factory::{RendererFactory, RendererLease};
pub use format::{supported_formats, supports, TileFormat};
pub use http::{AsyncHttpClient, HttpBackend, HttpRenderer, ReqwestClient, DEFAULT_HTTP_TIMEOUT};
pub use limiter::RenderLimiter;
pub use options::{LayerSelection, RendererOptions};
pub use plain::{parse_color, PlainBackend, PlainRenderer};
pub use style::{CompiledStyle, CompiledStyleBackend, RenderEngine, StyleCompiler};

#[cfg(test)]
pub use http::tests::MockHttpClient;

use std::collections::BTreeMap;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::pool::{PoolStats, Poolable};
use crate::BoxFuture;

/// An encoded tile with its response headers and timing breakdown.
#[derive(Debug, Clone, Default)]
pub struct Tile {
    pub buffer: Bytes,
    pub headers: BTreeMap<String, String>,
    /// Named phase timings (`render`, `encode`, `layer0.render`, ...).
    pub stats: BTreeMap<String, Duration>,
}

impl Tile {
    pub fn new(buffer: impl Into<Bytes>, content_type: &str) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), content_type.to_string());
        Self {
            buffer: buffer.into(),
            headers,
            stats: BTreeMap::new(),
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("Content-Type").map(String::as_str)
    }
}

/// Renderer counters: pool occupancy plus backend-specific cache counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RendererStats {
    pub pool: PoolStats,
    pub cache: BTreeMap<String, u64>,
}

/// A renderer instance bound to one configuration and format.
pub trait RendererHandle: Send + Sync {
    fn get_tile(&self, z: u8, x: u32, y: u32) -> BoxFuture<'_, Result<Tile>>;

    fn get_metadata(&self) -> BoxFuture<'_, Result<Value>>;

    fn get_stats(&self) -> RendererStats {
        RendererStats::default()
    }

    /// Releases native resources. Called once, when the pool destroys the
    /// renderer.
    fn close(&self);
}

impl Poolable for dyn RendererHandle {
    fn close(&self) {
        RendererHandle::close(self)
    }
}
