//! Filter engine.
//!
//! Filters restrict a layer query by attribute or extent. Each one wraps its
//! input as a subquery, so several filters compose by nesting and their
//! order only changes nesting depth, never the selected rows.
//!
//! Declarations come from the map configuration ([`FilterDef`]); the values
//! to filter by come with each request ([`FilterParams`]). A declared filter
//! without request parameters is inactive.

mod bbox;
mod category;
mod range;

pub use bbox::{
    normalize as normalize_bbox, parse_bbox, BboxFilter, BboxRect, DEFAULT_GEOMETRY_COLUMN,
    DEFAULT_SRID,
};
pub use category::CategoryFilter;
pub use range::RangeFilter;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{MapError, Result};
use crate::mapconfig::{FilterDef, FilterKind};

/// Request-supplied values for one filter.
///
/// Which fields apply depends on the filter kind: `accept`/`reject` for
/// category, `min`/`max` for range, `bbox` for bbox.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterParams {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub accept: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reject: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<String>,
}

impl FilterParams {
    pub fn accept(values: Vec<Value>) -> Self {
        Self {
            accept: values,
            ..Self::default()
        }
    }

    pub fn range(min: Option<f64>, max: Option<f64>) -> Self {
        Self {
            min,
            max,
            ..Self::default()
        }
    }
}

/// Request filter values keyed by filter name.
pub type FilterValues = BTreeMap<String, FilterParams>;

/// An active, validated filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Bbox(BboxFilter),
    Category(CategoryFilter),
    Range(RangeFilter),
}

impl Filter {
    /// Builds a filter from its declaration and request values.
    ///
    /// # Errors
    ///
    /// - `MapError::Config` when a category or range declaration has no column
    /// - `MapError::Validation` when the request values are malformed
    pub fn new(name: &str, def: &FilterDef, params: &FilterParams) -> Result<Self> {
        let column = || {
            def.options.column.clone().ok_or_else(|| {
                MapError::Config(format!("Filter '{}' of type {} requires a column", name, def.kind))
            })
        };

        match def.kind {
            FilterKind::Category => Ok(Filter::Category(CategoryFilter::new(
                column()?,
                &params.accept,
                &params.reject,
            )?)),
            FilterKind::Range => Ok(Filter::Range(RangeFilter::new(
                column()?,
                params.min,
                params.max,
            )?)),
            FilterKind::Bbox => {
                let bbox = params.bbox.as_deref().ok_or_else(|| {
                    MapError::Validation(format!("Filter '{}' expects a bbox", name))
                })?;
                let column = def
                    .options
                    .column
                    .clone()
                    .unwrap_or_else(|| DEFAULT_GEOMETRY_COLUMN.to_string());
                let srid = def.options.srid.unwrap_or(DEFAULT_SRID);
                Ok(Filter::Bbox(BboxFilter::new(column, srid, bbox)?))
            }
        }
    }

    pub fn kind(&self) -> FilterKind {
        match self {
            Filter::Bbox(_) => FilterKind::Bbox,
            Filter::Category(_) => FilterKind::Category,
            Filter::Range(_) => FilterKind::Range,
        }
    }

    /// Wraps `query` with this filter's predicate.
    pub fn sql(&self, query: &str) -> String {
        match self {
            Filter::Bbox(f) => f.sql(query),
            Filter::Category(f) => f.sql(query),
            Filter::Range(f) => f.sql(query),
        }
    }
}

/// Builds the active filters among `declared`, skipping those without
/// request values.
pub fn active_filters(declared: &[(String, FilterDef)], values: &FilterValues) -> Result<Vec<Filter>> {
    declared
        .iter()
        .filter_map(|(name, def)| values.get(name).map(|params| Filter::new(name, def, params)))
        .collect()
}

/// Composes filters over a base query.
pub struct QueryBuilder;

impl QueryBuilder {
    /// Applies `filters` left to right: `f2.sql(f1.sql(base))`.
    pub fn get_sql(base: &str, filters: &[Filter]) -> String {
        filters
            .iter()
            .fold(base.to_string(), |query, filter| filter.sql(&query))
    }
}
