//! Mapsmith - multi-layer map tiles and widget analytics
//!
//! This library turns a declarative map configuration (an ordered list of
//! layers with widget and filter declarations) into rendered tiles and
//! aggregate statistics. Expensive renderers are pooled per configuration,
//! rendered tiles are cached, and widget SQL is composed from the layer
//! query and the active filters.
//!
//! # High-Level API
//!
//! ```ignore
//! use mapsmith::app::{AppConfig, MapsmithApp};
//! use mapsmith::mapconfig::{MapConfig, StaticMapConfigProvider};
//!
//! let app = MapsmithApp::start(AppConfig::default(), vec![]).await?;
//! let provider = StaticMapConfigProvider::new(config, params);
//! let tile = app.service().get_tile(&provider, 3, 4, 2).await?;
//!
//! let widgets = app.widgets(executor);
//! let result = widgets.evaluate(&config, "population", &request).await?;
//! ```
//!
//! SQL execution, style compilation and native rasterization are external
//! and plugged in through [`sql::SqlExecutor`], [`renderer::StyleCompiler`]
//! and [`renderer::RenderEngine`].

use std::future::Future;
use std::pin::Pin;

pub mod app;
pub mod cache;
pub mod config;
pub mod coord;
pub mod error;
pub mod filter;
pub mod logging;
pub mod mapconfig;
pub mod pool;
pub mod renderer;
pub mod sql;
pub mod widget;

pub use error::{MapError, Result};

/// Version of the mapsmith library and CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Boxed future for dyn-compatible async traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
