//! Map configuration model.
//!
//! A [`MapConfig`] is the validated, immutable description of one map: its
//! ordered layers, the widgets and filters declared on each layer, and any
//! per-layer datasource override. It is parsed from a JSON document:
//!
//! ```json
//! {
//!   "version": "1.5.0",
//!   "layers": [
//!     { "type": "plain", "options": { "color": "#ffffff" } },
//!     { "type": "mapnik", "options": {
//!         "sql": "select * from populated_places",
//!         "cartocss": "#layer { marker-fill: red; }",
//!         "cartocss_version": "2.3.0",
//!         "widgets": {
//!           "pop": { "type": "histogram", "options": { "column": "pop_max" } }
//!         }
//!     } }
//!   ],
//!   "datasource": { "1": { "dbname": "analytics" } }
//! }
//! ```
//!
//! Aggregation and histogram widgets imply a category or range filter of
//! the same name on their column unless the layer declares one explicitly.

mod layer;
mod provider;

pub use layer::{
    Datasource, FilterDef, FilterKind, FilterOptions, Layer, LayerOptions, LayerType, WidgetDef,
    WidgetKind, WidgetOptions,
};
pub use provider::{MapConfigProvider, RequestParams, ResolvedMapConfig, StaticMapConfigProvider};

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{MapError, Result};

/// Default map configuration document version.
pub const DEFAULT_VERSION: &str = "1.0.0";

/// Serialized form of a map configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapConfigDocument {
    #[serde(default = "default_version")]
    pub version: String,
    pub layers: Vec<Layer>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub datasource: BTreeMap<usize, Datasource>,
}

fn default_version() -> String {
    DEFAULT_VERSION.to_string()
}

/// Validated, immutable map configuration.
#[derive(Debug, Clone)]
pub struct MapConfig {
    document: MapConfigDocument,
    id: String,
    /// Widget name to owning layer index.
    widget_index: HashMap<String, usize>,
}

impl MapConfig {
    /// Parses and validates a JSON map configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let document: MapConfigDocument = serde_json::from_str(json)?;
        Self::try_from(document)
    }

    /// Builds a configuration from layers alone.
    pub fn from_layers(layers: Vec<Layer>) -> Result<Self> {
        Self::try_from(MapConfigDocument {
            version: default_version(),
            layers,
            datasource: BTreeMap::new(),
        })
    }

    /// Content id: SHA-256 of the canonical JSON document.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn document(&self) -> &MapConfigDocument {
        &self.document
    }

    pub fn version(&self) -> &str {
        &self.document.version
    }

    pub fn layers(&self) -> &[Layer] {
        &self.document.layers
    }

    pub fn layer_count(&self) -> usize {
        self.document.layers.len()
    }

    pub fn layer(&self, index: usize) -> Result<&Layer> {
        self.document
            .layers
            .get(index)
            .ok_or_else(|| MapError::NotFound(format!("layer {}", index)))
    }

    pub fn layer_type(&self, index: usize) -> Result<LayerType> {
        Ok(self.layer(index)?.layer_type)
    }

    /// SQL of a layer; layers without a query cannot back widgets.
    pub fn layer_sql(&self, index: usize) -> Result<&str> {
        self.layer(index)?
            .options
            .sql
            .as_deref()
            .ok_or_else(|| MapError::Config(format!("layer {} has no sql", index)))
    }

    pub fn layer_datasource(&self, index: usize) -> Option<&Datasource> {
        self.document.datasource.get(&index)
    }

    /// Looks up a widget by name, returning its layer index and declaration.
    pub fn widget(&self, name: &str) -> Result<(usize, &WidgetDef)> {
        let layer = *self
            .widget_index
            .get(name)
            .ok_or_else(|| MapError::NotFound(format!("widget '{}'", name)))?;
        let def = &self.document.layers[layer].options.widgets[name];
        Ok((layer, def))
    }

    /// Widgets declared on a layer, by name.
    pub fn layer_widgets(&self, index: usize) -> Result<&BTreeMap<String, WidgetDef>> {
        Ok(&self.layer(index)?.options.widgets)
    }

    /// Filter declarations applying to a layer, including the implicit
    /// filters of its aggregation and histogram widgets.
    ///
    /// `exclude` drops the filter with that name, which is how a widget
    /// avoids filtering itself.
    pub fn layer_filters(&self, index: usize, exclude: Option<&str>) -> Result<Vec<(String, FilterDef)>> {
        let layer = self.layer(index)?;
        let mut filters: BTreeMap<String, FilterDef> = layer.options.filters.clone();

        for (name, widget) in &layer.options.widgets {
            if filters.contains_key(name) {
                continue;
            }
            let kind = match widget.kind {
                WidgetKind::Aggregation => FilterKind::Category,
                WidgetKind::Histogram => FilterKind::Range,
                _ => continue,
            };
            if let Some(column) = &widget.options.column {
                filters.insert(name.clone(), FilterDef::new(kind, column.clone()));
            }
        }

        if let Some(name) = exclude {
            filters.remove(name);
        }

        Ok(filters.into_iter().collect())
    }

    /// All list widgets as `(layer, name, declaration)`.
    pub fn lists(&self) -> Vec<(usize, &str, &WidgetDef)> {
        let mut lists: Vec<_> = self
            .document
            .layers
            .iter()
            .enumerate()
            .flat_map(|(i, layer)| {
                layer
                    .options
                    .widgets
                    .iter()
                    .filter(|(_, def)| def.kind == WidgetKind::List)
                    .map(move |(name, def)| (i, name.as_str(), def))
            })
            .collect();
        lists.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        lists
    }

    /// Looks up a list widget by name.
    pub fn list(&self, name: &str) -> Result<(usize, &WidgetDef)> {
        match self.widget(name) {
            Ok((layer, def)) if def.kind == WidgetKind::List => Ok((layer, def)),
            _ => Err(MapError::NotFound(format!("list '{}'", name))),
        }
    }
}

impl TryFrom<MapConfigDocument> for MapConfig {
    type Error = MapError;

    fn try_from(document: MapConfigDocument) -> Result<Self> {
        if document.layers.is_empty() {
            return Err(MapError::Config("map configuration has no layers".into()));
        }

        let mut widget_index = HashMap::new();
        for (i, layer) in document.layers.iter().enumerate() {
            for name in layer.options.widgets.keys() {
                if widget_index.insert(name.clone(), i).is_some() {
                    return Err(MapError::Config(format!(
                        "widget '{}' is declared more than once",
                        name
                    )));
                }
            }
            if !layer.options.widgets.is_empty() && layer.options.sql.is_none() {
                return Err(MapError::Config(format!(
                    "layer {} declares widgets but has no sql",
                    i
                )));
            }
        }

        if let Some(index) = document
            .datasource
            .keys()
            .find(|&&i| i >= document.layers.len())
        {
            return Err(MapError::Config(format!(
                "datasource declared for missing layer {}",
                index
            )));
        }

        let canonical = serde_json::to_vec(&document)?;
        let id = format!("{:x}", Sha256::digest(&canonical));

        Ok(Self {
            document,
            id,
            widget_index,
        })
    }
}
