//! Numeric range filter.

use crate::error::{MapError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Bounds {
    Between(f64, f64),
    Above(f64),
    Below(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RangeFilter {
    column: String,
    bounds: Bounds,
}

impl RangeFilter {
    /// # Errors
    ///
    /// Returns `MapError::Validation` when neither bound is given or a bound
    /// is not finite.
    pub fn new(column: impl Into<String>, min: Option<f64>, max: Option<f64>) -> Result<Self> {
        if min.into_iter().chain(max).any(|v| !v.is_finite()) {
            return Err(MapError::Validation("Range filter bounds must be finite".into()));
        }
        let bounds = match (min, max) {
            (Some(min), Some(max)) => Bounds::Between(min, max),
            (Some(min), None) => Bounds::Above(min),
            (None, Some(max)) => Bounds::Below(max),
            (None, None) => {
                return Err(MapError::Validation(
                    "Range filter expects at least one of min or max".into(),
                ))
            }
        };
        Ok(Self {
            column: column.into(),
            bounds,
        })
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn sql(&self, query: &str) -> String {
        let condition = match self.bounds {
            Bounds::Between(min, max) => format!("{} BETWEEN {} AND {}", self.column, min, max),
            Bounds::Above(min) => format!("{} > {}", self.column, min),
            Bounds::Below(max) => format!("{} < {}", self.column, max),
        };
        format!("SELECT * FROM ({}) _cdb_range_filter WHERE {}", query, condition)
    }
}
