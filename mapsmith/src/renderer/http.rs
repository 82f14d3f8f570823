//! Remote tile backend.
//!
//! Fetches basemap tiles from a URL template such as
//! `https://{s}.basemaps.example.com/{z}/{x}/{y}.png`. `{s}` rotates through
//! the layer's `subdomains`.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde_json::{json, Value};
use tracing::debug;

use super::backend::{RenderGroup, RendererBackend};
use super::format::TileFormat;
use super::{RendererHandle, Tile};
use crate::error::{MapError, Result};
use crate::mapconfig::LayerType;
use crate::BoxFuture;

/// Default request timeout for remote tiles.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!("mapsmith/", env!("CARGO_PKG_VERSION"));

/// Asynchronous HTTP GET.
///
/// Abstracted so tests can inject a mock client.
pub trait AsyncHttpClient: Send + Sync {
    /// Performs a GET request and returns the response body.
    ///
    /// # Errors
    ///
    /// Returns a message describing the transport failure or non-success
    /// status.
    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, std::result::Result<Bytes, String>>;
}

/// HTTP client backed by reqwest.
#[derive(Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Creates a client with the default timeout.
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_HTTP_TIMEOUT)
    }

    /// Creates a client with a custom timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| MapError::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl AsyncHttpClient for ReqwestClient {
    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, std::result::Result<Bytes, String>> {
        Box::pin(async move {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| format!("Request failed: {}", e))?;

            if !response.status().is_success() {
                return Err(format!("HTTP {} from {}", response.status(), url));
            }

            response
                .bytes()
                .await
                .map_err(|e| format!("Failed to read response: {}", e))
        })
    }
}

/// Builds [`HttpRenderer`]s for `http` layers.
pub struct HttpBackend {
    client: Arc<dyn AsyncHttpClient>,
    /// Allowed URL template prefixes. Empty allows every template.
    whitelist: Vec<String>,
}

impl HttpBackend {
    pub fn new(client: Arc<dyn AsyncHttpClient>) -> Self {
        Self {
            client,
            whitelist: Vec::new(),
        }
    }

    pub fn with_whitelist(mut self, whitelist: Vec<String>) -> Self {
        self.whitelist = whitelist;
        self
    }

    fn is_allowed(&self, template: &str) -> bool {
        self.whitelist.is_empty()
            || self
                .whitelist
                .iter()
                .any(|prefix| matches_prefix(template, prefix))
    }
}

/// A whitelist entry matches a template when it is a prefix ending at a
/// path boundary, so `https://a.test` does not admit `https://a.test.evil/`.
fn matches_prefix(template: &str, prefix: &str) -> bool {
    match template.strip_prefix(prefix) {
        Some(rest) => {
            prefix.ends_with('/')
                || rest.is_empty()
                || rest.starts_with(['/', '?', '#'])
        }
        None => false,
    }
}

impl RendererBackend for HttpBackend {
    fn family(&self) -> LayerType {
        LayerType::HttpBasemap
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
                .ok_or_else(|| MapError::Config("Empty http layer group".into()))?;
            let template = layer.options.url_template.as_deref().ok_or_else(|| {
                MapError::Config(format!("Http layer {} requires a urlTemplate", index))
            })?;

            if !self.is_allowed(template) {
                return Err(MapError::Config(format!(
                    "Http layer {} url template is not whitelisted: {}",
                    index, template
                )));
            }

            debug!(layer = index, template, "Created http renderer");
            Ok(Arc::new(HttpRenderer {
                layer: *index,
                template: template.to_string(),
                subdomains: layer.options.subdomains.clone(),
                client: Arc::clone(&self.client),
            }) as Arc<dyn RendererHandle>)
        })
    }
}

/// Proxies tiles from a remote tile service.
pub struct HttpRenderer {
    layer: usize,
    template: String,
    subdomains: Vec<String>,
    client: Arc<dyn AsyncHttpClient>,
}

impl HttpRenderer {
    /// Expands the URL template for a tile.
    pub fn tile_url(&self, z: u8, x: u32, y: u32) -> String {
        let mut url = self
            .template
            .replace("{z}", &z.to_string())
            .replace("{x}", &x.to_string())
            .replace("{y}", &y.to_string());

        if !self.subdomains.is_empty() {
            let pick = (x as usize + y as usize) % self.subdomains.len();
            url = url.replace("{s}", &self.subdomains[pick]);
        }
        url
    }
}

impl RendererHandle for HttpRenderer {
    fn get_tile(&self, z: u8, x: u32, y: u32) -> BoxFuture<'_, Result<Tile>> {
        Box::pin(async move {
            let url = self.tile_url(z, x, y);
            let body = self
                .client
                .get(&url)
                .await
                .map_err(|e| MapError::render(self.layer, e))?;
            Ok(Tile::new(body, "image/png"))
        })
    }

    fn get_metadata(&self) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move { Ok(json!({ "type": "http", "urlTemplate": self.template })) })
    }

    fn close(&self) {}
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::mapconfig::{Layer, LayerOptions};
    use parking_lot::Mutex;

    /// Mock HTTP client recording requested URLs.
    pub struct MockHttpClient {
        pub response: std::result::Result<Bytes, String>,
        pub requests: Mutex<Vec<String>>,
    }

    impl MockHttpClient {
        pub fn new(response: std::result::Result<Bytes, String>) -> Self {
            Self {
                response,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    impl AsyncHttpClient for MockHttpClient {
        fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, std::result::Result<Bytes, String>> {
            self.requests.lock().push(url.to_string());
            let response = self.response.clone();
            Box::pin(async move { response })
        }
    }

    fn group(index: usize, template: &str, subdomains: &[&str]) -> RenderGroup {
        let layer = Layer::new(
            LayerType::HttpBasemap,
            LayerOptions {
                url_template: Some(template.to_string()),
                subdomains: subdomains.iter().map(|s| s.to_string()).collect(),
                ..LayerOptions::default()
            },
        );
        RenderGroup {
            family: LayerType::HttpBasemap,
            layers: vec![(index, layer)],
        }
    }

    #[tokio::test]
    async fn test_fetches_expanded_url() {
        let client = Arc::new(MockHttpClient::new(Ok(Bytes::from_static(b"png"))));
        let backend = HttpBackend::new(client.clone());

        let renderer = backend
            .create(&group(0, "https://{s}.tiles.test/{z}/{x}/{y}.png", &["a", "b"]), TileFormat::Png)
            .await
            .unwrap();
        let tile = renderer.get_tile(3, 1, 2).await.unwrap();

        assert_eq!(&tile.buffer[..], b"png");
        assert_eq!(
            client.requests.lock().as_slice(),
            ["https://b.tiles.test/3/1/2.png".to_string()]
        );
    }

    #[tokio::test]
    async fn test_fetch_failure_is_render_error_for_layer() {
        let client = Arc::new(MockHttpClient::new(Err("HTTP 404".into())));
        let backend = HttpBackend::new(client);

        let renderer = backend
            .create(&group(2, "https://tiles.test/{z}/{x}/{y}.png", &[]), TileFormat::Png)
            .await
            .unwrap();
        let err = renderer.get_tile(0, 0, 0).await.err().unwrap();
        assert!(matches!(err, MapError::Render { layer: 2, .. }));
    }

    #[tokio::test]
    async fn test_whitelist_rejects_unknown_hosts() {
        let client = Arc::new(MockHttpClient::new(Ok(Bytes::new())));
        let backend = HttpBackend::new(client)
            .with_whitelist(vec!["https://allowed.test/".to_string()]);

        let rejected = backend
            .create(&group(0, "https://evil.test/{z}/{x}/{y}.png", &[]), TileFormat::Png)
            .await;
        assert!(matches!(rejected, Err(MapError::Config(_))));

        let accepted = backend
            .create(&group(0, "https://allowed.test/{z}/{x}/{y}.png", &[]), TileFormat::Png)
            .await;
        assert!(accepted.is_ok());
    }

    #[tokio::test]
    async fn test_whitelist_prefix_stops_at_host_boundary() {
        let client = Arc::new(MockHttpClient::new(Ok(Bytes::new())));
        let backend = HttpBackend::new(client)
            .with_whitelist(vec!["https://tiles.example.com".to_string()]);

        let lookalike = backend
            .create(
                &group(0, "https://tiles.example.com.evil.net/{z}/{x}/{y}.png", &[]),
                TileFormat::Png,
            )
            .await;
        assert!(matches!(lookalike, Err(MapError::Config(_))));

        let same_host = backend
            .create(&group(0, "https://tiles.example.com/{z}/{x}/{y}.png", &[]), TileFormat::Png)
            .await;
        assert!(same_host.is_ok());
    }

    #[test]
    fn test_matches_prefix_boundaries() {
        assert!(matches_prefix("https://a.test/x", "https://a.test"));
        assert!(matches_prefix("https://a.test", "https://a.test"));
        assert!(matches_prefix("https://a.test?k=v", "https://a.test"));
        assert!(matches_prefix("https://a.test/tiles/1", "https://a.test/tiles/"));
        assert!(!matches_prefix("https://a.testing/x", "https://a.test"));
        assert!(!matches_prefix("https://b.test/x", "https://a.test"));
    }

    #[tokio::test]
    async fn test_missing_template_is_config_error() {
        let backend = HttpBackend::new(Arc::new(MockHttpClient::new(Ok(Bytes::new()))));
        let group = RenderGroup {
            family: LayerType::HttpBasemap,
            layers: vec![(0, Layer::new(LayerType::HttpBasemap, LayerOptions::default()))],
        };
        assert!(matches!(
            backend.create(&group, TileFormat::Png).await,
            Err(MapError::Config(_))
        ));
    }
}
