//! Style-compiled backends.
//!
//! Raster-style, time-series and vector layers are rendered by a native
//! engine from a compiled style. Both the style compiler and the engine are
//! external; this module only wires them into a [`RendererBackend`].

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, warn};

use super::backend::{RenderGroup, RendererBackend};
use super::format::TileFormat;
use super::RendererHandle;
use crate::error::Result;
use crate::mapconfig::LayerType;
use crate::BoxFuture;

/// Render-ready style descriptor produced by a [`StyleCompiler`].
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledStyle {
    pub family: LayerType,
    /// Configuration indices of the compiled layers.
    pub layers: Vec<usize>,
    /// Engine-specific descriptor (e.g. an XML or JSON style document).
    pub descriptor: Value,
}

/// Compiles layer options (sql, cartocss, interactivity, ...) into a style.
pub trait StyleCompiler: Send + Sync {
    /// # Errors
    ///
    /// Returns `MapError::Config` when the style does not compile.
    fn compile<'a>(&'a self, group: &'a RenderGroup) -> BoxFuture<'a, Result<CompiledStyle>>;
}

/// Native rendering engine.
pub trait RenderEngine: Send + Sync {
    fn create<'a>(
        &'a self,
        style: &'a CompiledStyle,
        format: TileFormat,
    ) -> BoxFuture<'a, Result<Arc<dyn RendererHandle>>>;
}

/// Backend that compiles a group's style, then hands it to an engine.
pub struct CompiledStyleBackend {
    family: LayerType,
    compiler: Arc<dyn StyleCompiler>,
    engine: Arc<dyn RenderEngine>,
}

impl CompiledStyleBackend {
    pub fn new(
        family: LayerType,
        compiler: Arc<dyn StyleCompiler>,
        engine: Arc<dyn RenderEngine>,
    ) -> Self {
        Self {
            family,
            compiler,
            engine,
        }
    }
}

impl RendererBackend for CompiledStyleBackend {
    fn family(&self) -> LayerType {
        self.family
    }

    fn create<'a>(
        &'a self,
        group: &'a RenderGroup,
        format: TileFormat,
    ) -> BoxFuture<'a, Result<Arc<dyn RendererHandle>>> {
        Box::pin(async move {
            let start = Instant::now();
            let style = self.compiler.compile(group).await.map_err(|e| {
                warn!(family = %self.family, layers = ?group.indices(), error = %e, "Style compilation failed");
                e
            })?;
            let compile_ms = start.elapsed().as_millis() as u64;

            let renderer = self.engine.create(&style, format).await?;
            debug!(
                family = %self.family,
                layers = ?group.indices(),
                format = %format,
                compile_ms,
                "Created compiled-style renderer"
            );
            Ok(renderer)
        })
    }
}
