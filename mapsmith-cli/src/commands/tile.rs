//! `mapsmith tile` - render one tile through the full pipeline.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Args;
use mapsmith::app::{AppConfig, MapsmithApp};
use mapsmith::logging::{init_logging, DEFAULT_LOG_FILE};
use mapsmith::mapconfig::StaticMapConfigProvider;
use tracing::info;

use super::common::{load_config_file, load_map_config};
use crate::error::CliError;

#[derive(Debug, Args)]
pub struct TileArgs {
    /// Map configuration JSON
    #[arg(long)]
    pub config: PathBuf,

    /// Zoom level
    #[arg(long)]
    pub z: u8,

    /// Tile column
    #[arg(long)]
    pub x: u32,

    /// Tile row (0 at the north edge)
    #[arg(long)]
    pub y: u32,

    /// Tile format (png, png32, grid.json, mvt, torque.json)
    #[arg(long, default_value = "png")]
    pub format: String,

    /// Layers to render: "all" or a comma-separated index list
    #[arg(long, default_value = "all")]
    pub layer: String,

    /// Output file path
    #[arg(long)]
    pub output: PathBuf,

    /// Directory for the log file
    #[arg(long, default_value = mapsmith::logging::DEFAULT_LOG_DIR)]
    pub log_dir: PathBuf,
}

pub fn run(args: TileArgs, config_file: Option<&Path>) -> Result<(), CliError> {
    let _guard = init_logging(&args.log_dir, DEFAULT_LOG_FILE)
        .map_err(|e| CliError::LoggingInit(e.to_string()))?;

    let settings = load_config_file(config_file)?;
    let map_config = Arc::new(load_map_config(&args.config)?);

    let mut params = BTreeMap::new();
    params.insert("format".to_string(), args.format.clone());
    params.insert("layer".to_string(), args.layer.clone());
    let provider = StaticMapConfigProvider::new(map_config, params);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::Args(format!("Failed to create Tokio runtime: {}", e)))?;

    let tile = runtime.block_on(async {
        let app = MapsmithApp::start(AppConfig::from_config_file(&settings), vec![]).await?;
        let result = app.service().get_tile(&provider, args.z, args.x, args.y).await;
        app.shutdown().await;
        result.map_err(CliError::from)
    })?;

    std::fs::write(&args.output, &tile.buffer).map_err(|error| CliError::FileWrite {
        path: args.output.display().to_string(),
        error,
    })?;

    info!(
        bytes = tile.buffer.len(),
        content_type = tile.content_type().unwrap_or("application/octet-stream"),
        output = %args.output.display(),
        "Tile written"
    );
    for (phase, elapsed) in &tile.stats {
        info!(phase = %phase, elapsed_ms = elapsed.as_millis() as u64, "Render timing");
    }

    Ok(())
}
