//! Coordinate math module
//!
//! Pure functions for Web Mercator tile geometry: resolution (metres per
//! pixel) at a zoom level and the projected extent of a tile. Tile space
//! grows downward (`y = 0` is the northern edge) while projected space
//! grows upward, so `extent` inverts the y axis.

mod types;

pub use types::{
    CoordError, Extent, TileCoord, EARTH_RADIUS, MAX_LAT, MAX_LON, MAX_ZOOM, MIN_LAT, MIN_LON,
    MIN_ZOOM, TILE_SIZE,
};

use std::f64::consts::PI;

/// Circumference of the projected world in metres.
#[inline]
pub fn world_circumference() -> f64 {
    2.0 * PI * EARTH_RADIUS
}

/// Half the projected world width; the distance from the origin to an edge.
#[inline]
pub fn origin_shift() -> f64 {
    resolution_unchecked(0) * TILE_SIZE as f64 / 2.0
}

/// Returns the resolution in metres per pixel at the given zoom level.
///
/// # Errors
///
/// Returns `CoordError::InvalidZoom` if `zoom` exceeds [`MAX_ZOOM`].
#[inline]
pub fn resolution(zoom: u8) -> Result<f64, CoordError> {
    if zoom > MAX_ZOOM {
        return Err(CoordError::InvalidZoom(zoom));
    }
    Ok(resolution_unchecked(zoom))
}

#[inline]
fn resolution_unchecked(zoom: u8) -> f64 {
    // Dividing by a power of two is exact, so each zoom step halves exactly
    world_circumference() / TILE_SIZE as f64 / 2.0_f64.powi(zoom as i32)
}

/// Returns the projected extent of tile `x`/`y` at `zoom`.
///
/// # Errors
///
/// Returns a `CoordError` if the zoom is unsupported or `x`/`y` fall
/// outside `[0, 2^zoom)`.
pub fn extent(x: u32, y: u32, zoom: u8) -> Result<Extent, CoordError> {
    let tile = TileCoord::new(zoom, x, y)?;
    Ok(tile_extent(&tile))
}

/// Projected extent of an already validated tile.
pub fn tile_extent(tile: &TileCoord) -> Extent {
    let shift = origin_shift();
    let size = TILE_SIZE as f64 * resolution_unchecked(tile.z);

    let xmin = -shift + tile.x as f64 * size;
    let xmax = xmin + size;
    let ymax = shift - tile.y as f64 * size;
    let ymin = ymax - size;

    Extent {
        xmin,
        ymin,
        xmax,
        ymax,
    }
}

/// Geographic bounds of a tile as `(west, south, east, north)` in degrees.
pub fn tile_bounds_lon_lat(tile: &TileCoord) -> (f64, f64, f64, f64) {
    let n = tile.tiles_per_axis() as f64;

    let lon = |x: f64| x / n * 360.0 - 180.0;
    // Inverse Web Mercator for the row edge
    let lat = |y: f64| (PI * (1.0 - 2.0 * y / n)).sinh().atan().to_degrees();

    let west = lon(tile.x as f64);
    let east = lon(tile.x as f64 + 1.0);
    let north = lat(tile.y as f64);
    let south = lat(tile.y as f64 + 1.0);

    (west, south, east, north)
}
