//! Widget engine.
//!
//! Widgets are analytical summaries computed over a layer's filtered query.
//! Each variant knows how to build its SQL and how to format the rows that
//! come back; [`WidgetEngine`] composes the layer query with the active
//! filters, runs it through the [`crate::sql::SqlExecutor`] and tags the
//! result.

mod aggregation;
mod engine;
mod formula;
mod histogram;
mod list;

pub use aggregation::{
    AggregationCategory, AggregationFunction, AggregationResult, AggregationWidget, SearchCategory,
    SearchResult, MAX_CATEGORIES, OTHER_CATEGORY,
};
pub use engine::{WidgetEngine, WidgetRequest};
pub use formula::{FormulaOperation, FormulaResult, FormulaWidget};
pub use histogram::{HistogramBin, HistogramResult, HistogramWidget, MAX_BINS, MIN_BINS};
pub use list::{ListResult, ListWidget};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::mapconfig::{WidgetDef, WidgetKind};
use crate::sql::Row;

/// Per-request overrides. Only histograms read them today.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WidgetOverrides {
    #[serde(default)]
    pub start: Option<f64>,
    #[serde(default)]
    pub end: Option<f64>,
    #[serde(default)]
    pub bins: Option<u32>,
}

/// Formatted widget output, tagged with the widget type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WidgetResult {
    Aggregation(AggregationResult),
    Histogram(HistogramResult),
    Formula(FormulaResult),
    List(ListResult),
}

impl WidgetResult {
    pub fn result_type(&self) -> WidgetKind {
        match self {
            Self::Aggregation(_) => WidgetKind::Aggregation,
            Self::Histogram(_) => WidgetKind::Histogram,
            Self::Formula(_) => WidgetKind::Formula,
            Self::List(_) => WidgetKind::List,
        }
    }
}

/// A validated widget.
#[derive(Debug, Clone, PartialEq)]
pub enum Widget {
    Aggregation(AggregationWidget),
    Histogram(HistogramWidget),
    Formula(FormulaWidget),
    List(ListWidget),
}

impl Widget {
    /// Validates a declaration.
    ///
    /// # Errors
    ///
    /// Returns `MapError::Config` when options required by the widget kind
    /// are missing or invalid.
    pub fn new(def: &WidgetDef) -> Result<Self> {
        Ok(match def.kind {
            WidgetKind::Aggregation => Widget::Aggregation(AggregationWidget::new(&def.options)?),
            WidgetKind::Histogram => Widget::Histogram(HistogramWidget::new(&def.options)?),
            WidgetKind::Formula => Widget::Formula(FormulaWidget::new(&def.options)?),
            WidgetKind::List => Widget::List(ListWidget::new(&def.options)?),
        })
    }

    pub fn build_query(&self, query: &str, overrides: &WidgetOverrides) -> Result<String> {
        match self {
            Widget::Aggregation(w) => Ok(w.build_query(query)),
            Widget::Histogram(w) => w.build_query(query, overrides),
            Widget::Formula(w) => Ok(w.build_query(query)),
            Widget::List(w) => Ok(w.build_query(query)),
        }
    }

    pub fn format(&self, rows: &[Row], overrides: &WidgetOverrides) -> WidgetResult {
        match self {
            Widget::Aggregation(w) => WidgetResult::Aggregation(w.format(rows)),
            Widget::Histogram(w) => WidgetResult::Histogram(w.format(rows, overrides)),
            Widget::Formula(w) => WidgetResult::Formula(w.format(rows)),
            Widget::List(w) => WidgetResult::List(w.format(rows)),
        }
    }

    pub fn result_type(&self) -> WidgetKind {
        match self {
            Widget::Aggregation(_) => WidgetKind::Aggregation,
            Widget::Histogram(_) => WidgetKind::Histogram,
            Widget::Formula(_) => WidgetKind::Formula,
            Widget::List(_) => WidgetKind::List,
        }
    }
}
