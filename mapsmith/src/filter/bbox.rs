//! Bounding box filter.
//!
//! Requests arrive as `west,south,east,north` in degrees and may cross the
//! antimeridian or wrap around the world several times (map clients pan
//! freely). They are normalised into at most two rectangles inside
//! `[-180, 180]` before being turned into SQL:
//!
//! 1. Latitudes are clamped to the web-mercator limit.
//! 2. A `west > east` box is read as crossing the antimeridian.
//! 3. A span of 360° or more collapses to the whole world.
//! 4. Otherwise the box is shifted by the multiple of 360° that brings
//!    `west` into `[-180, 180)`, and split in two if it still crosses 180°.

use crate::coord::{MAX_LAT, MIN_LAT};
use crate::error::{MapError, Result};

/// Default geometry column filtered by bbox filters.
pub const DEFAULT_GEOMETRY_COLUMN: &str = "the_geom_webmercator";

/// Default SRID of the geometry column.
pub const DEFAULT_SRID: u32 = 3857;

/// A rectangle in degrees, `west <= east`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BboxRect {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl BboxRect {
    pub const WORLD: BboxRect = BboxRect {
        west: -180.0,
        south: MIN_LAT,
        east: 180.0,
        north: MAX_LAT,
    };
}

/// Parses `west,south,east,north`.
///
/// # Errors
///
/// Returns `MapError::Validation` unless the string holds exactly four
/// finite numbers.
pub fn parse_bbox(bbox: &str) -> Result<[f64; 4]> {
    let invalid = || {
        MapError::Validation(format!(
            "Invalid bbox '{}', expected west,south,east,north",
            bbox
        ))
    };

    let values: Vec<f64> = bbox
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| invalid())?;

    match values.as_slice() {
        [w, s, e, n] if values.iter().all(|v| v.is_finite()) => Ok([*w, *s, *e, *n]),
        _ => Err(invalid()),
    }
}

/// Normalises a bbox into one or two rectangles inside `[-180, 180]`.
pub fn normalize(west: f64, south: f64, east: f64, north: f64) -> Vec<BboxRect> {
    let south = south.clamp(MIN_LAT, MAX_LAT);
    let north = north.clamp(MIN_LAT, MAX_LAT);
    let rect = |west, east| BboxRect {
        west,
        south,
        east,
        north,
    };

    let mut west = west;
    let mut east = if west > east { east + 360.0 } else { east };

    if east - west >= 360.0 {
        return vec![rect(-180.0, 180.0)];
    }

    if (-180.0..=180.0).contains(&west) && east <= 180.0 {
        return vec![rect(west, east)];
    }

    let shift = ((west + 180.0) / 360.0).floor() * 360.0;
    west -= shift;
    east -= shift;

    if east > 180.0 {
        vec![rect(west, 180.0), rect(-180.0, east - 360.0)]
    } else {
        vec![rect(west, east)]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BboxFilter {
    column: String,
    srid: u32,
    rects: Vec<BboxRect>,
}

impl BboxFilter {
    /// # Errors
    ///
    /// Returns `MapError::Validation` for a malformed bbox string.
    pub fn new(column: impl Into<String>, srid: u32, bbox: &str) -> Result<Self> {
        let [w, s, e, n] = parse_bbox(bbox)?;
        Ok(Self {
            column: column.into(),
            srid,
            rects: normalize(w, s, e, n),
        })
    }

    /// Filter on the default geometry column and SRID.
    pub fn with_defaults(bbox: &str) -> Result<Self> {
        Self::new(DEFAULT_GEOMETRY_COLUMN, DEFAULT_SRID, bbox)
    }

    pub fn rects(&self) -> &[BboxRect] {
        &self.rects
    }

    pub fn sql(&self, query: &str) -> String {
        let predicates: Vec<String> = self
            .rects
            .iter()
            .map(|r| {
                format!(
                    "{} && ST_Transform(ST_MakeEnvelope({}, {}, {}, {}, 4326), {})",
                    self.column, r.west, r.south, r.east, r.north, self.srid
                )
            })
            .collect();

        let condition = match predicates.as_slice() {
            [single] => single.clone(),
            many => format!("({})", many.join(" OR ")),
        };
        format!("SELECT * FROM ({}) _cdb_bbox_filter WHERE {}", query, condition)
    }
}
