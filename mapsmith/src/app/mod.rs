//! Application bootstrap and lifecycle management.
//!
//! [`MapsmithApp`] wires the shared pieces of a tile server together and owns
//! their lifecycle:
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                        MapsmithApp                         │
//! │                                                            │
//! │  PoolManager<dyn RendererHandle> ◄── PoolReaper (task)     │
//! │         ▲                                                  │
//! │  RendererFactory ── backends (plain, http, ...)            │
//! │         ▲          RenderLimiter (composite work)          │
//! │  TileService ───── TileCache (before / after)              │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use mapsmith::app::{AppConfig, MapsmithApp};
//!
//! let app = MapsmithApp::start(AppConfig::default(), vec![]).await?;
//! let tile = app.service().get_tile(&provider, 3, 4, 2).await?;
//! app.shutdown().await;
//! ```

mod bootstrap;
mod config;
mod error;
mod service;

pub use bootstrap::MapsmithApp;
pub use config::AppConfig;
pub use error::AppError;
pub use service::{tile_identity, ServiceStats, TileService};
