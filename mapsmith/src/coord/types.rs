//! Coordinate type definitions

use std::fmt;
use std::str::FromStr;

/// Web Mercator valid latitude range
pub const MIN_LAT: f64 = -85.0511287798066;
pub const MAX_LAT: f64 = 85.0511287798066;

/// Valid longitude range
pub const MIN_LON: f64 = -180.0;
pub const MAX_LON: f64 = 180.0;

/// Supported zoom levels
pub const MIN_ZOOM: u8 = 0;
pub const MAX_ZOOM: u8 = 30;

/// Semi-major axis of the WGS84 ellipsoid in metres.
pub const EARTH_RADIUS: f64 = 6_378_137.0;

/// Default tile edge length in pixels.
pub const TILE_SIZE: u32 = 256;

/// Tile address in the Web Mercator / Slippy Map grid.
///
/// `y` grows southward (0 at the north edge), `x` grows eastward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    /// Zoom level
    pub z: u8,
    /// X coordinate (east-west), 0 at west
    pub x: u32,
    /// Y coordinate (north-south), 0 at north
    pub y: u32,
}

impl TileCoord {
    /// Creates a validated tile coordinate.
    pub fn new(z: u8, x: u32, y: u32) -> Result<Self, CoordError> {
        if z > MAX_ZOOM {
            return Err(CoordError::InvalidZoom(z));
        }
        let n = 1u64 << z;
        if u64::from(x) >= n {
            return Err(CoordError::InvalidColumn { x, zoom: z });
        }
        if u64::from(y) >= n {
            return Err(CoordError::InvalidRow { y, zoom: z });
        }
        Ok(Self { z, x, y })
    }

    /// Number of tiles along one axis at this zoom.
    #[inline]
    pub fn tiles_per_axis(&self) -> u64 {
        1u64 << self.z
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

impl FromStr for TileCoord {
    type Err = CoordError;

    /// Parses a `{z}/{x}/{y}` path segment.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim_matches('/').split('/').collect();
        if parts.len() != 3 {
            return Err(CoordError::InvalidAddress(s.to_string()));
        }
        let parse = |v: &str| -> Result<i64, CoordError> {
            v.parse::<i64>()
                .map_err(|_| CoordError::InvalidAddress(s.to_string()))
        };
        let (z, x, y) = (parse(parts[0])?, parse(parts[1])?, parse(parts[2])?);
        if z < 0 || z > i64::from(MAX_ZOOM) {
            return Err(CoordError::InvalidAddress(s.to_string()));
        }
        if x < 0 || y < 0 || x > i64::from(u32::MAX) || y > i64::from(u32::MAX) {
            return Err(CoordError::InvalidAddress(s.to_string()));
        }
        TileCoord::new(z as u8, x as u32, y as u32)
    }
}

/// Projected bounding box in Web Mercator metres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl Extent {
    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }
}

/// Errors that can occur during coordinate math.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoordError {
    /// Zoom level is outside the supported range
    #[error("Invalid zoom level: {0} (must be between {MIN_ZOOM} and {MAX_ZOOM})")]
    InvalidZoom(u8),
    /// Column is outside `[0, 2^zoom)`
    #[error("Invalid tile x: {x} (must be below 2^{zoom})")]
    InvalidColumn { x: u32, zoom: u8 },
    /// Row is outside `[0, 2^zoom)`
    #[error("Invalid tile y: {y} (must be below 2^{zoom})")]
    InvalidRow { y: u32, zoom: u8 },
    /// Tile address is not three non-negative integers
    #[error("Invalid tile address: '{0}' (expected z/x/y)")]
    InvalidAddress(String),
}
