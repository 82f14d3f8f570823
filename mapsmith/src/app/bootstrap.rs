//! Application bootstrap implementation.
//!
//! Components are started in dependency order: renderer pool and its reaper,
//! the tile cache, the composite limiter, then the renderer factory with the
//! built-in and caller-supplied backends.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::config::AppConfig;
use super::error::AppError;
use super::service::TileService;
use crate::cache::{create_tile_cache, TileCache};
use crate::pool::{PoolManager, PoolReaper};
use crate::renderer::{
    AsyncHttpClient, HttpBackend, PlainBackend, RenderLimiter, RendererBackend, RendererFactory,
    RendererHandle, ReqwestClient,
};
use crate::sql::SqlExecutor;
use crate::widget::WidgetEngine;

/// Mapsmith application with owned service lifecycle.
pub struct MapsmithApp {
    config: AppConfig,
    pool: Arc<PoolManager<dyn RendererHandle>>,
    service: TileService,
    reaper_shutdown: CancellationToken,
    reaper: JoinHandle<()>,
}

impl MapsmithApp {
    /// Start the application with the reqwest HTTP client.
    ///
    /// `backends` are registered after the built-in `plain` and `http`
    /// backends and replace them when they serve the same layer type.
    ///
    /// Must be called inside a Tokio runtime; the pool reaper is spawned on
    /// it.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client or the tile cache cannot be created.
    pub async fn start(
        config: AppConfig,
        backends: Vec<Arc<dyn RendererBackend>>,
    ) -> Result<Self, AppError> {
        let client = Arc::new(ReqwestClient::with_timeout(config.http_timeout)?);
        Self::start_with_http_client(config, client, backends).await
    }

    /// Start the application with a custom HTTP client for `http` layers.
    pub async fn start_with_http_client(
        config: AppConfig,
        http_client: Arc<dyn AsyncHttpClient>,
        backends: Vec<Arc<dyn RendererBackend>>,
    ) -> Result<Self, AppError> {
        info!("Starting MapsmithApp");

        // 1. Renderer pool and its reaper
        let pool: Arc<PoolManager<dyn RendererHandle>> =
            Arc::new(PoolManager::new(config.pool.clone()));
        let reaper_shutdown = CancellationToken::new();
        let reaper = tokio::spawn(PoolReaper::new(Arc::clone(&pool)).run(reaper_shutdown.clone()));

        info!(
            max_per_key = config.pool.max_per_key,
            idle_timeout_secs = config.pool.idle_timeout.as_secs(),
            "Renderer pool started"
        );

        // 2. Tile cache
        let cache = match create_tile_cache(config.cache_policy, config.cache_capacity) {
            Ok(cache) => cache,
            Err(e) => {
                reaper_shutdown.cancel();
                return Err(e.into());
            }
        };

        // 3. Composite limiter and renderer factory
        let limiter = Arc::new(match config.render_concurrency {
            Some(n) => RenderLimiter::new(n, "composite"),
            None => RenderLimiter::with_cpu_count("composite"),
        });

        let mut factory = RendererFactory::new(Arc::clone(&pool), Arc::clone(&limiter))
            .with_tile_size(config.tile_size)
            .with_backend(Arc::new(PlainBackend::new(config.tile_size)))
            .with_backend(Arc::new(
                HttpBackend::new(http_client).with_whitelist(config.url_whitelist.clone()),
            ));
        for backend in backends {
            factory.register(backend);
        }

        info!(
            families = ?factory.families(),
            composite_workers = limiter.max_concurrent(),
            cache = %config.cache_policy,
            "Renderer factory ready"
        );

        let service = TileService::new(Arc::new(factory), cache);

        Ok(Self {
            config,
            pool,
            service,
            reaper_shutdown,
            reaper,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Tile request pipeline.
    pub fn service(&self) -> &TileService {
        &self.service
    }

    pub fn pool(&self) -> &Arc<PoolManager<dyn RendererHandle>> {
        &self.pool
    }

    pub fn cache(&self) -> &Arc<dyn TileCache> {
        self.service.cache()
    }

    /// Widget engine over `executor`, using the configured query timeout.
    pub fn widgets(&self, executor: Arc<dyn SqlExecutor>) -> WidgetEngine {
        WidgetEngine::new(executor).with_query_timeout(self.config.query_timeout)
    }

    /// Shutdown the application gracefully.
    ///
    /// Stops the reaper, then closes every pooled renderer. Renderers still
    /// checked out close when they are released.
    pub async fn shutdown(self) {
        info!("Shutting down MapsmithApp");

        self.reaper_shutdown.cancel();
        if let Err(e) = self.reaper.await {
            warn!(error = %e, "Pool reaper did not stop cleanly");
        }

        self.pool.shutdown();
        info!("MapsmithApp shutdown complete");
    }
}
