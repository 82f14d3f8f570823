//! Multi-layer blend compositor.
//!
//! A [`BlendRenderer`] owns one renderer per layer group. A tile request is
//! fanned out to every renderer concurrently (bounded), results are put
//! back in declaration order and alpha-composited bottom to top onto a
//! transparent canvas, which is then PNG encoded.
//!
//! The first failing layer aborts the composite; its error is returned and
//! the other in-flight renders are dropped.

use std::io::Cursor;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::stream::{self, StreamExt, TryStreamExt};
use image::{imageops, DynamicImage, ImageFormat, RgbaImage};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::format::TileFormat;
use super::limiter::RenderLimiter;
use super::{RendererHandle, RendererStats, Tile};
use crate::error::{MapError, Result};
use crate::mapconfig::LayerType;
use crate::BoxFuture;

/// Encodes an RGBA image as PNG.
pub(crate) fn encode_png(image: &RgbaImage) -> std::result::Result<Vec<u8>, image::ImageError> {
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(image.clone()).write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

/// One contributing renderer and the layer it reports errors against.
pub struct BlendLayer {
    pub index: usize,
    pub family: LayerType,
    pub renderer: Arc<dyn RendererHandle>,
}

/// Composites the output of several renderers into one tile.
pub struct BlendRenderer {
    layers: Vec<BlendLayer>,
    format: TileFormat,
    tile_size: u32,
    fanout: usize,
    limiter: Arc<RenderLimiter>,
}

impl BlendRenderer {
    /// # Arguments
    ///
    /// * `layers` - Contributing renderers in declaration order (bottom first)
    /// * `format` - Output format; must be blendable
    /// * `tile_size` - Canvas edge length in pixels
    /// * `fanout` - Maximum concurrent layer renders per tile
    /// * `limiter` - Gate for the CPU-bound composite and encode step
    pub fn new(
        layers: Vec<BlendLayer>,
        format: TileFormat,
        tile_size: u32,
        fanout: usize,
        limiter: Arc<RenderLimiter>,
    ) -> Self {
        Self {
            layers,
            format,
            tile_size,
            fanout: fanout.max(1),
            limiter,
        }
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    async fn render_layers(&self, z: u8, x: u32, y: u32) -> Result<Vec<Tile>> {
        let renders: Vec<_> = self
            .layers
            .iter()
            .enumerate()
            .map(|(position, layer)| {
                let renderer = Arc::clone(&layer.renderer);
                let index = layer.index;
                async move {
                    renderer
                        .get_tile(z, x, y)
                        .await
                        .map(|tile| (position, tile))
                        .map_err(|e| MapError::in_layer(index, e))
                }
            })
            .collect();

        let mut tiles: Vec<(usize, Tile)> = stream::iter(renders)
            .buffer_unordered(self.fanout)
            .try_collect()
            .await?;

        tiles.sort_by_key(|(position, _)| *position);
        Ok(tiles.into_iter().map(|(_, tile)| tile).collect())
    }
}

/// Decodes each layer and overlays it on a transparent canvas.
fn composite(buffers: &[(usize, Bytes)], tile_size: u32) -> Result<RgbaImage> {
    let mut canvas = RgbaImage::new(tile_size, tile_size);
    for (index, buffer) in buffers {
        let mut layer = image::load_from_memory(buffer)
            .map_err(|e| MapError::render(*index, format!("Failed to decode layer image: {}", e)))?
            .to_rgba8();
        if layer.dimensions() != (tile_size, tile_size) {
            layer = imageops::resize(&layer, tile_size, tile_size, imageops::FilterType::Triangle);
        }
        imageops::overlay(&mut canvas, &layer, 0, 0);
    }
    Ok(canvas)
}

impl RendererHandle for BlendRenderer {
    fn get_tile(&self, z: u8, x: u32, y: u32) -> BoxFuture<'_, Result<Tile>> {
        Box::pin(async move {
            let fanout_start = Instant::now();
            let tiles = self.render_layers(z, x, y).await.map_err(|e| {
                warn!(z, x, y, error = %e, "Blend layer failed");
                e
            })?;
            let fanout_time = fanout_start.elapsed();

            let buffers: Vec<(usize, Bytes)> = self
                .layers
                .iter()
                .zip(&tiles)
                .map(|(layer, tile)| (layer.index, tile.buffer.clone()))
                .collect();
            let tile_size = self.tile_size;
            let first_layer = self.layers.first().map(|l| l.index).unwrap_or(0);

            let (encoded, composite_time, encode_time) = self
                .limiter
                .run(move || -> Result<(Vec<u8>, Duration, Duration)> {
                    let composite_start = Instant::now();
                    let canvas = composite(&buffers, tile_size)?;
                    let composite_time = composite_start.elapsed();

                    let encode_start = Instant::now();
                    let png = encode_png(&canvas).map_err(|e| {
                        MapError::render(first_layer, format!("PNG encode failed: {}", e))
                    })?;
                    Ok((png, composite_time, encode_start.elapsed()))
                })
                .await
                .map_err(|e| MapError::render(first_layer, format!("Composite task failed: {}", e)))??;

            let mut tile = Tile::new(encoded, self.format.content_type());
            for (layer, layer_tile) in self.layers.iter().zip(&tiles) {
                for (name, value) in &layer_tile.stats {
                    tile.stats.insert(format!("layer{}.{}", layer.index, name), *value);
                }
            }
            let render_time = fanout_time + composite_time;
            tile.stats.insert("render".to_string(), render_time);
            tile.stats.insert("encode".to_string(), encode_time);

            debug!(
                z,
                x,
                y,
                layers = self.layers.len(),
                render_ms = render_time.as_millis() as u64,
                encode_ms = encode_time.as_millis() as u64,
                "Blended tile"
            );
            Ok(tile)
        })
    }

    fn get_metadata(&self) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move {
            let mut layers = Vec::with_capacity(self.layers.len());
            for layer in &self.layers {
                let meta = layer.renderer.get_metadata().await?;
                layers.push(json!({
                    "index": layer.index,
                    "type": layer.family.to_string(),
                    "meta": meta,
                }));
            }
            Ok(json!({
                "format": self.format.as_str(),
                "layer_count": self.layers.len(),
                "layers": layers,
            }))
        })
    }

    fn get_stats(&self) -> RendererStats {
        let mut stats = RendererStats::default();
        for layer in &self.layers {
            for (name, value) in layer.renderer.get_stats().cache {
                *stats.cache.entry(name).or_insert(0) += value;
            }
        }
        stats
    }

    fn close(&self) {
        for layer in &self.layers {
            layer.renderer.close();
        }
    }
}
