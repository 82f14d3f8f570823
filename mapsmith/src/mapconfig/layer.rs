//! Layer, widget and filter declarations.
//!
//! These are plain data parsed from the map configuration document. The
//! behaviour attached to widgets and filters lives in [`crate::widget`] and
//! [`crate::filter`]; declarations are only checked for shape here.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Renderer family of a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LayerType {
    /// Styled SQL layer rendered by the native raster engine.
    #[serde(rename = "mapnik", alias = "cartodb", alias = "raster-style")]
    RasterStyle,
    /// Remote tile service fetched over HTTP.
    #[serde(rename = "http", alias = "http-basemap")]
    HttpBasemap,
    /// Time-series (torque) layer.
    #[serde(rename = "torque", alias = "time-series")]
    TimeSeries,
    /// Solid colour background.
    #[serde(rename = "plain")]
    Plain,
    /// Vector tile layer.
    #[serde(rename = "vector", alias = "mvt")]
    Vector,
}

impl Default for LayerType {
    fn default() -> Self {
        LayerType::RasterStyle
    }
}

impl fmt::Display for LayerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RasterStyle => write!(f, "mapnik"),
            Self::HttpBasemap => write!(f, "http"),
            Self::TimeSeries => write!(f, "torque"),
            Self::Plain => write!(f, "plain"),
            Self::Vector => write!(f, "vector"),
        }
    }
}

/// Connection override for a single layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Datasource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dbname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Widget variant tag as written in declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WidgetKind {
    Aggregation,
    Histogram,
    Formula,
    List,
}

impl fmt::Display for WidgetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aggregation => write!(f, "aggregation"),
            Self::Histogram => write!(f, "histogram"),
            Self::Formula => write!(f, "formula"),
            Self::List => write!(f, "list"),
        }
    }
}

/// Options accepted by widget declarations. Which ones are required
/// depends on the widget kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    /// Aggregation function for aggregation widgets (count, sum, avg, min, max).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation_column: Option<String>,
    /// Operation for formula widgets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bins: Option<u32>,
    /// Projected columns for list widgets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
}

/// `{ type, options }` widget declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetDef {
    #[serde(rename = "type")]
    pub kind: WidgetKind,
    #[serde(default)]
    pub options: WidgetOptions,
}

/// Filter variant tag as written in declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    Category,
    Range,
    Bbox,
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Category => write!(f, "category"),
            Self::Range => write!(f, "range"),
            Self::Bbox => write!(f, "bbox"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    /// Spatial reference of the geometry column (bbox filters only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub srid: Option<u32>,
}

/// `{ type, options }` filter declaration. Request parameters are supplied
/// separately at evaluation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterDef {
    #[serde(rename = "type")]
    pub kind: FilterKind,
    #[serde(default)]
    pub options: FilterOptions,
}

impl FilterDef {
    pub fn new(kind: FilterKind, column: impl Into<String>) -> Self {
        Self {
            kind,
            options: FilterOptions {
                column: Some(column.into()),
                srid: None,
            },
        }
    }
}

/// Layer options. Unknown keys are preserved in `extra` so backends can
/// read family-specific settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cartocss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cartocss_version: Option<String>,
    #[serde(
        default,
        deserialize_with = "comma_or_list",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub interactivity: Vec<String>,
    /// Tile URL template for http layers, e.g. `https://{s}.tiles/{z}/{x}/{y}.png`.
    #[serde(default, rename = "urlTemplate", alias = "url_template", skip_serializing_if = "Option::is_none")]
    pub url_template: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subdomains: Vec<String>,
    /// Fill colour for plain layers (`#rrggbb` or `#rrggbbaa`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub widgets: BTreeMap<String, WidgetDef>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub filters: BTreeMap<String, FilterDef>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One layer of a map configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    #[serde(rename = "type", default)]
    pub layer_type: LayerType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub options: LayerOptions,
}

impl Layer {
    pub fn new(layer_type: LayerType, options: LayerOptions) -> Self {
        Self {
            layer_type,
            id: None,
            options,
        }
    }

    /// Convenience constructor for a styled SQL layer.
    pub fn sql(sql: impl Into<String>) -> Self {
        Self::new(
            LayerType::RasterStyle,
            LayerOptions {
                sql: Some(sql.into()),
                ..LayerOptions::default()
            },
        )
    }

    /// Convenience constructor for a solid colour layer.
    pub fn plain(color: impl Into<String>) -> Self {
        Self::new(
            LayerType::Plain,
            LayerOptions {
                color: Some(color.into()),
                ..LayerOptions::default()
            },
        )
    }
}

fn comma_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum CommaOrList {
        Comma(String),
        List(Vec<String>),
    }

    Ok(match CommaOrList::deserialize(deserializer)? {
        CommaOrList::Comma(s) => s
            .split(',')
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect(),
        CommaOrList::List(v) => v,
    })
}
