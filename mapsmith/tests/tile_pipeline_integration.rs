//! Integration tests for the tile pipeline.
//!
//! These tests drive `MapsmithApp` end to end with in-process collaborators:
//! - a style compiler and render engine standing in for the native renderer
//! - an HTTP client that never touches the network
//!
//! Run with: `cargo test --test tile_pipeline_integration`

use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use image::{ImageFormat, Rgba, RgbaImage};
use serde_json::{json, Value};

use mapsmith::app::{AppConfig, MapsmithApp};
use mapsmith::cache::CachePolicy;
use mapsmith::mapconfig::{LayerType, MapConfig, StaticMapConfigProvider};
use mapsmith::pool::PoolConfig;
use mapsmith::renderer::{
    AsyncHttpClient, CompiledStyle, CompiledStyleBackend, RenderEngine, RenderGroup,
    RendererHandle, StyleCompiler, Tile, TileFormat,
};
use mapsmith::{BoxFuture, MapError, Result};

// ============================================================================
// Helpers
// ============================================================================

fn solid_png(color: [u8; 4]) -> Bytes {
    let img = RgbaImage::from_pixel(256, 256, Rgba(color));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    Bytes::from(out.into_inner())
}

fn pixel(buffer: &[u8]) -> [u8; 4] {
    image::load_from_memory(buffer).unwrap().to_rgba8().get_pixel(128, 128).0
}

struct OfflineHttp;

impl AsyncHttpClient for OfflineHttp {
    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, std::result::Result<Bytes, String>> {
        Box::pin(async move { Err(format!("offline: {}", url)) })
    }
}

/// Compiles any group that has a cartocss option.
#[derive(Default)]
struct TestCompiler {
    compiles: AtomicUsize,
}

impl StyleCompiler for TestCompiler {
    fn compile<'a>(&'a self, group: &'a RenderGroup) -> BoxFuture<'a, Result<CompiledStyle>> {
        Box::pin(async move {
            self.compiles.fetch_add(1, Ordering::SeqCst);
            let mut styles = Vec::new();
            for (index, layer) in &group.layers {
                let css = layer
                    .options
                    .cartocss
                    .clone()
                    .ok_or_else(|| MapError::Config(format!("layer {} has no cartocss", index)))?;
                styles.push(json!(css));
            }
            Ok(CompiledStyle {
                family: group.family,
                layers: group.indices(),
                descriptor: Value::Array(styles),
            })
        })
    }
}

/// Renders every tile with one colour; `fail` makes tiles error.
struct TestEngine {
    color: [u8; 4],
    fail: bool,
    creates: AtomicUsize,
    renders: Arc<AtomicUsize>,
}

impl TestEngine {
    fn new(color: [u8; 4]) -> Self {
        Self {
            color,
            fail: false,
            creates: AtomicUsize::new(0),
            renders: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new([0, 0, 0, 0])
        }
    }
}

struct TestRenderer {
    tile: Bytes,
    fail: bool,
    renders: Arc<AtomicUsize>,
}

impl RendererHandle for TestRenderer {
    fn get_tile(&self, _z: u8, _x: u32, _y: u32) -> BoxFuture<'_, Result<Tile>> {
        Box::pin(async move {
            self.renders.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(MapError::QueryExecution("relation does not exist".into()));
            }
            Ok(Tile::new(self.tile.clone(), "image/png"))
        })
    }

    fn get_metadata(&self) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async { Ok(json!({ "engine": "test" })) })
    }

    fn close(&self) {}
}

impl RenderEngine for TestEngine {
    fn create<'a>(
        &'a self,
        _style: &'a CompiledStyle,
        _format: TileFormat,
    ) -> BoxFuture<'a, Result<Arc<dyn RendererHandle>>> {
        Box::pin(async move {
            self.creates.fetch_add(1, Ordering::SeqCst);
            let renderer: Arc<dyn RendererHandle> = Arc::new(TestRenderer {
                tile: solid_png(self.color),
                fail: self.fail,
                renders: Arc::clone(&self.renders),
            });
            Ok(renderer)
        })
    }
}

async fn start(engine: Arc<TestEngine>, compiler: Arc<TestCompiler>) -> MapsmithApp {
    let backend = Arc::new(CompiledStyleBackend::new(
        LayerType::RasterStyle,
        compiler,
        engine,
    ));
    let config = AppConfig::default()
        .with_cache(CachePolicy::Lru, 16)
        .with_pool(PoolConfig {
            max_per_key: 2,
            ..PoolConfig::default()
        });
    MapsmithApp::start_with_http_client(config, Arc::new(OfflineHttp), vec![backend])
        .await
        .unwrap()
}

fn provider(layers: Value, params: &[(&str, &str)]) -> StaticMapConfigProvider {
    let config = MapConfig::from_json(&json!({ "layers": layers }).to_string()).unwrap();
    let params: BTreeMap<String, String> = params
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    StaticMapConfigProvider::new(Arc::new(config), params)
}

fn raster_layer(css: &str) -> Value {
    json!({ "type": "mapnik", "options": { "sql": "select * from places", "cartocss": css } })
}

// ============================================================================
// Integration Tests
// ============================================================================

/// A single contributing renderer's tile is returned byte for byte.
#[tokio::test]
async fn test_single_layer_tile_is_unmodified() {
    let engine = Arc::new(TestEngine::new([10, 20, 30, 255]));
    let app = start(Arc::clone(&engine), Arc::default()).await;
    let provider = provider(json!([raster_layer("#places{}")]), &[]);

    let tile = app.service().get_tile(&provider, 3, 2, 5).await.unwrap();

    assert_eq!(tile.buffer, solid_png([10, 20, 30, 255]));
    app.shutdown().await;
}

/// A plain background and a raster layer are composited in declaration
/// order, the later layer on top.
#[tokio::test]
async fn test_blend_composites_in_declaration_order() {
    let engine = Arc::new(TestEngine::new([0, 0, 255, 255]));
    let app = start(engine, Arc::default()).await;
    let provider = provider(
        json!([
            { "type": "plain", "options": { "color": "#ff0000" } },
            raster_layer("#places{}")
        ]),
        &[],
    );

    let tile = app.service().get_tile(&provider, 1, 1, 0).await.unwrap();

    assert_eq!(tile.content_type(), Some("image/png"));
    assert_eq!(pixel(&tile.buffer), [0, 0, 255, 255]);
    assert!(tile.stats.contains_key("render"));
    assert!(tile.stats.contains_key("encode"));
    app.shutdown().await;
}

/// Consecutive raster layers compile into one style and one renderer.
#[tokio::test]
async fn test_consecutive_raster_layers_share_renderer() {
    let engine = Arc::new(TestEngine::new([0, 255, 0, 255]));
    let compiler = Arc::new(TestCompiler::default());
    let app = start(Arc::clone(&engine), Arc::clone(&compiler)).await;
    let provider = provider(json!([raster_layer("#a{}"), raster_layer("#b{}")]), &[]);

    app.service().get_tile(&provider, 0, 0, 0).await.unwrap();

    assert_eq!(compiler.compiles.load(Ordering::SeqCst), 1);
    assert_eq!(engine.creates.load(Ordering::SeqCst), 1);
    app.shutdown().await;
}

/// Tiles of the same configuration reuse the pooled renderer; the cache
/// serves repeated requests without rendering.
#[tokio::test]
async fn test_pool_reuse_and_cache_hits() {
    let engine = Arc::new(TestEngine::new([1, 2, 3, 255]));
    let app = start(Arc::clone(&engine), Arc::default()).await;
    let provider = provider(json!([raster_layer("#places{}")]), &[]);

    for (x, y) in [(0, 0), (1, 0), (1, 1)] {
        app.service().get_tile(&provider, 1, x, y).await.unwrap();
    }
    assert_eq!(engine.creates.load(Ordering::SeqCst), 1);
    assert_eq!(engine.renders.load(Ordering::SeqCst), 3);

    app.service().get_tile(&provider, 1, 0, 0).await.unwrap();
    assert_eq!(engine.renders.load(Ordering::SeqCst), 3);

    let stats = app.service().stats();
    assert_eq!(stats.cache.hits, 1);
    assert_eq!(stats.cache.entries, 3);
    assert_eq!(stats.pools, 1);
    assert_eq!(stats.pool.unused, 1);
    app.shutdown().await;
}

/// Different formats or layer selections get separate pools.
#[tokio::test]
async fn test_distinct_options_distinct_pools() {
    let engine = Arc::new(TestEngine::new([1, 2, 3, 255]));
    let app = start(Arc::clone(&engine), Arc::default()).await;
    let layers = json!([
        { "type": "plain", "options": { "color": "#ffffff" } },
        raster_layer("#places{}")
    ]);

    let all = provider(layers.clone(), &[]);
    let only_raster = provider(layers, &[("layer", "1")]);
    app.service().get_tile(&all, 0, 0, 0).await.unwrap();
    app.service().get_tile(&only_raster, 0, 0, 0).await.unwrap();

    assert_eq!(app.service().stats().pools, 2);
    assert_eq!(engine.creates.load(Ordering::SeqCst), 2);
    app.shutdown().await;
}

/// A failing layer aborts the composite with its own index, and nothing is
/// cached.
#[tokio::test]
async fn test_blend_fails_fast_with_layer_index() {
    let engine = Arc::new(TestEngine::failing());
    let app = start(engine, Arc::default()).await;
    let provider = provider(
        json!([
            { "type": "plain", "options": { "color": "#ff0000" } },
            { "type": "plain", "options": { "color": "#00ff00" } },
            raster_layer("#places{}")
        ]),
        &[],
    );

    let err = app.service().get_tile(&provider, 2, 1, 1).await.unwrap_err();

    match err {
        MapError::Render { layer, message, .. } => {
            assert_eq!(layer, 2);
            assert!(message.contains("relation does not exist"));
        }
        other => panic!("expected render error, got {other:?}"),
    }
    assert_eq!(app.service().stats().cache.entries, 0);
    app.shutdown().await;
}

/// Style compilation errors surface as configuration errors.
#[tokio::test]
async fn test_style_compile_failure_is_config_error() {
    let engine = Arc::new(TestEngine::new([0, 0, 0, 255]));
    let app = start(Arc::clone(&engine), Arc::default()).await;
    let provider = provider(
        json!([{ "type": "mapnik", "options": { "sql": "select 1" } }]),
        &[],
    );

    let err = app.service().get_tile(&provider, 0, 0, 0).await.unwrap_err();

    assert!(matches!(err, MapError::Config(_)));
    assert!(err.is_client_error());
    assert_eq!(engine.creates.load(Ordering::SeqCst), 0);
    app.shutdown().await;
}

/// Format support is checked before any renderer is built.
#[tokio::test]
async fn test_unsupported_format_rejected_before_rendering() {
    let engine = Arc::new(TestEngine::new([0, 0, 0, 255]));
    let app = start(Arc::clone(&engine), Arc::default()).await;
    let provider = provider(
        json!([
            raster_layer("#a{}"),
            { "type": "plain", "options": { "color": "#ffffff" } },
            raster_layer("#b{}")
        ]),
        &[("format", "grid.json")],
    );

    // The plain layer is skipped, leaving two raster groups that cannot
    // blend a grid
    let err = app.service().get_tile(&provider, 0, 0, 0).await.unwrap_err();
    assert!(matches!(err, MapError::Config(_)));

    let provider = provider_with_layer_selection();
    let err = app.service().get_tile(&provider, 0, 0, 0).await.unwrap_err();
    assert!(matches!(err, MapError::NotFound(_)));

    assert_eq!(engine.creates.load(Ordering::SeqCst), 0);
    app.shutdown().await;
}

fn provider_with_layer_selection() -> StaticMapConfigProvider {
    provider(json!([raster_layer("#a{}")]), &[("layer", "0,3")])
}

/// A style change resets the map's pools, so the next tile builds a new
/// renderer.
#[tokio::test]
async fn test_reset_rebuilds_renderers() {
    let engine = Arc::new(TestEngine::new([9, 9, 9, 255]));
    let app = start(Arc::clone(&engine), Arc::default()).await;
    let provider = provider(json!([raster_layer("#places{}")]), &[("format", "png32")]);

    app.service().get_tile(&provider, 0, 0, 0).await.unwrap();
    assert_eq!(app.service().reset(&provider), 1);
    app.service().get_tile(&provider, 1, 0, 0).await.unwrap();

    assert_eq!(engine.creates.load(Ordering::SeqCst), 2);
    app.shutdown().await;
}

/// Blend metadata lists every contributing group.
#[tokio::test]
async fn test_blend_metadata() {
    let engine = Arc::new(TestEngine::new([9, 9, 9, 255]));
    let app = start(engine, Arc::default()).await;
    let provider = provider(
        json!([{ "type": "plain", "options": { "color": "#000000" } }, raster_layer("#a{}")]),
        &[],
    );

    let meta = app.service().get_metadata(&provider).await.unwrap();

    assert_eq!(meta["layer_count"], 2);
    assert_eq!(meta["layers"][0]["type"], "plain");
    assert_eq!(meta["layers"][1]["meta"]["engine"], "test");
    app.shutdown().await;
}
