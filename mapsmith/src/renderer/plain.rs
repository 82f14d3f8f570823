//! Solid colour backend.

use std::sync::Arc;

use bytes::Bytes;
use image::{Rgba, RgbaImage};
use serde_json::{json, Value};
use tracing::debug;

use super::backend::{RenderGroup, RendererBackend};
use super::blend::encode_png;
use super::format::TileFormat;
use super::{RendererHandle, Tile};
use crate::coord::TILE_SIZE;
use crate::error::{MapError, Result};
use crate::mapconfig::LayerType;
use crate::BoxFuture;

/// Parses `#rrggbb` or `#rrggbbaa`.
pub fn parse_color(color: &str) -> Result<Rgba<u8>> {
    let invalid = || MapError::Config(format!("Invalid color '{}'", color));

    let hex = color.strip_prefix('#').ok_or_else(invalid)?;
    if !(hex.len() == 6 || hex.len() == 8) || !hex.is_ascii() {
        return Err(invalid());
    }

    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
    let alpha = if hex.len() == 8 { channel(6)? } else { 255 };
    Ok(Rgba([channel(0)?, channel(2)?, channel(4)?, alpha]))
}

/// Builds [`PlainRenderer`]s from a layer's `color` option.
pub struct PlainBackend {
    tile_size: u32,
}

impl PlainBackend {
    pub fn new(tile_size: u32) -> Self {
        Self { tile_size }
    }
}

impl Default for PlainBackend {
    fn default() -> Self {
        Self::new(TILE_SIZE)
    }
}

impl RendererBackend for PlainBackend {
    fn family(&self) -> LayerType {
        LayerType::Plain
    }

    fn create<'a>(
        &'a self,
        group: &'a RenderGroup,
        _format: TileFormat,
    ) -> BoxFuture<'a, Result<Arc<dyn RendererHandle>>> {
        Box::pin(async move {
            let (index, layer) = group
                .layers
                .first()
                .ok_or_else(|| MapError::Config("Empty plain layer group".into()))?;
            let color = layer.options.color.as_deref().ok_or_else(|| {
                MapError::Config(format!("Plain layer {} requires a color", index))
            })?;

            let renderer = PlainRenderer::new(color, self.tile_size)?;
            debug!(layer = index, color, "Created plain renderer");
            Ok(Arc::new(renderer) as Arc<dyn RendererHandle>)
        })
    }
}

/// Renders every tile as the same solid colour.
pub struct PlainRenderer {
    color: String,
    png: Bytes,
}

impl PlainRenderer {
    pub fn new(color: &str, tile_size: u32) -> Result<Self> {
        let rgba = parse_color(color)?;
        let image = RgbaImage::from_pixel(tile_size, tile_size, rgba);
        let png = encode_png(&image).map_err(|e| MapError::Config(e.to_string()))?;
        Ok(Self {
            color: color.to_string(),
            png: Bytes::from(png),
        })
    }
}

impl RendererHandle for PlainRenderer {
    fn get_tile(&self, _z: u8, _x: u32, _y: u32) -> BoxFuture<'_, Result<Tile>> {
        Box::pin(async move { Ok(Tile::new(self.png.clone(), "image/png")) })
    }

    fn get_metadata(&self) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move { Ok(json!({ "type": "plain", "color": self.color })) })
    }

    fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapconfig::Layer;

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("#ff8000").unwrap(), Rgba([255, 128, 0, 255]));
        assert_eq!(parse_color("#00000080").unwrap(), Rgba([0, 0, 0, 128]));
        assert!(parse_color("ff8000").is_err());
        assert!(parse_color("#ff80").is_err());
        assert!(parse_color("#gg0000").is_err());
    }

    #[tokio::test]
    async fn test_plain_tile_is_solid_png() {
        let renderer = PlainRenderer::new("#336699", 16).unwrap();
        let tile = renderer.get_tile(3, 1, 2).await.unwrap();
        assert_eq!(tile.content_type(), Some("image/png"));

        let decoded = image::load_from_memory(&tile.buffer).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (16, 16));
        assert!(decoded.pixels().all(|p| *p == Rgba([0x33, 0x66, 0x99, 255])));
    }

    #[tokio::test]
    async fn test_backend_requires_color() {
        let mut group = RenderGroup::new(LayerType::Plain);
        let mut layer = Layer::plain("#fff");
        layer.options.color = None;
        group.layers.push((2, layer));

        let err = PlainBackend::default()
            .create(&group, TileFormat::Png)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, MapError::Config(ref m) if m.contains("layer 2")));
    }
}
