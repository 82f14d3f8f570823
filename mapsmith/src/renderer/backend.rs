//! Renderer backend seam.

use std::sync::Arc;

use super::format::TileFormat;
use super::RendererHandle;
use crate::error::Result;
use crate::mapconfig::{Layer, LayerType};
use crate::BoxFuture;

/// Layers rendered together by one renderer instance.
///
/// Consecutive raster-style layers share a group so they are compiled into a
/// single style; every other family gets one group per layer.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderGroup {
    pub family: LayerType,
    /// `(index in the configuration, layer)` pairs, in declaration order.
    pub layers: Vec<(usize, Layer)>,
}

impl RenderGroup {
    pub fn new(family: LayerType) -> Self {
        Self {
            family,
            layers: Vec::new(),
        }
    }

    /// Configuration index of the first layer, used to attribute errors.
    pub fn first_index(&self) -> usize {
        self.layers.first().map(|(i, _)| *i).unwrap_or(0)
    }

    pub fn indices(&self) -> Vec<usize> {
        self.layers.iter().map(|(i, _)| *i).collect()
    }
}

/// Builds renderers for one layer family.
pub trait RendererBackend: Send + Sync {
    fn family(&self) -> LayerType;

    /// Builds a renderer for `group` producing `format`.
    ///
    /// Format support has already been checked by the factory.
    ///
    /// # Errors
    ///
    /// Returns `MapError::Config` for invalid layer options (bad colour,
    /// style compilation failure, missing url template).
    fn create<'a>(
        &'a self,
        group: &'a RenderGroup,
        format: TileFormat,
    ) -> BoxFuture<'a, Result<Arc<dyn RendererHandle>>>;
}
