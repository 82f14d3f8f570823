//! `mapsmith extent` - tile resolution and extent.

use clap::Args;
use mapsmith::coord::{extent, resolution, tile_bounds_lon_lat, TileCoord};
use mapsmith::MapError;

use crate::error::CliError;

#[derive(Debug, Args)]
pub struct ExtentArgs {
    /// Zoom level
    #[arg(long)]
    pub z: u8,

    /// Tile column
    #[arg(long)]
    pub x: u32,

    /// Tile row (0 at the north edge)
    #[arg(long)]
    pub y: u32,
}

pub fn run(args: ExtentArgs) -> Result<(), CliError> {
    let tile = TileCoord::new(args.z, args.x, args.y).map_err(MapError::from)?;
    let res = resolution(tile.z).map_err(MapError::from)?;
    let ext = extent(tile.x, tile.y, tile.z).map_err(MapError::from)?;
    let (west, south, east, north) = tile_bounds_lon_lat(&tile);

    println!("Tile:       {}", tile);
    println!("Resolution: {} m/px", res);
    println!(
        "Extent:     xmin={} ymin={} xmax={} ymax={}",
        ext.xmin, ext.ymin, ext.xmax, ext.ymax
    );
    println!("Bounds:     {},{},{},{}", west, south, east, north);

    Ok(())
}
