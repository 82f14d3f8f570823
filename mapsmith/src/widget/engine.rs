//! Widget evaluation against an SQL executor.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::aggregation::SearchResult;
use super::{Widget, WidgetOverrides, WidgetResult};
use crate::error::{MapError, Result};
use crate::filter::{active_filters, BboxFilter, Filter, FilterValues, QueryBuilder};
use crate::mapconfig::{MapConfig, WidgetDef};
use crate::sql::{QueryOptions, SqlExecutor};

/// Request-side inputs of a widget evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WidgetRequest {
    /// Apply the widget's own filter to its own query.
    #[serde(default)]
    pub own_filter: bool,
    /// Filter values keyed by filter name.
    #[serde(default)]
    pub filters: FilterValues,
    /// `west,south,east,north` applied to every widget query.
    #[serde(default)]
    pub bbox: Option<String>,
    #[serde(default)]
    pub overrides: WidgetOverrides,
}

/// Evaluates widgets of a map configuration.
pub struct WidgetEngine {
    executor: Arc<dyn SqlExecutor>,
    query_timeout: Option<Duration>,
}

impl WidgetEngine {
    pub fn new(executor: Arc<dyn SqlExecutor>) -> Self {
        Self {
            executor,
            query_timeout: None,
        }
    }

    /// Statement timeout passed through to the executor. `None` or zero
    /// disables it.
    pub fn with_query_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.query_timeout = timeout.filter(|t| !t.is_zero());
        self
    }

    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout
    }

    /// The layer query with every active filter applied, except the one
    /// named `exclude`.
    ///
    /// # Errors
    ///
    /// - `MapError::NotFound` for a missing layer
    /// - `MapError::Config` for a layer without sql or an invalid declaration
    /// - `MapError::Validation` for malformed filter values
    pub fn filtered_layer_sql(
        config: &MapConfig,
        layer: usize,
        request: &WidgetRequest,
        exclude: Option<&str>,
    ) -> Result<String> {
        let base = config.layer_sql(layer)?;
        let declared = config.layer_filters(layer, exclude)?;
        let mut filters = active_filters(&declared, &request.filters)?;
        if let Some(bbox) = &request.bbox {
            filters.push(Filter::Bbox(BboxFilter::with_defaults(bbox)?));
        }
        Ok(QueryBuilder::get_sql(base, &filters))
    }

    /// Validates the named widget and builds its SQL without running it.
    pub fn widget_sql(
        config: &MapConfig,
        name: &str,
        request: &WidgetRequest,
    ) -> Result<(Widget, String)> {
        let (layer, def) = config.widget(name)?;
        Self::build(config, layer, name, def, request)
    }

    fn build(
        config: &MapConfig,
        layer: usize,
        name: &str,
        def: &WidgetDef,
        request: &WidgetRequest,
    ) -> Result<(Widget, String)> {
        let widget = Widget::new(def)?;
        let exclude = (!request.own_filter).then_some(name);
        let query = Self::filtered_layer_sql(config, layer, request, exclude)?;
        let sql = widget.build_query(&query, &request.overrides)?;
        Ok((widget, sql))
    }

    fn query_options(&self, config: &MapConfig, layer: usize) -> QueryOptions {
        QueryOptions::read_only()
            .with_timeout(self.query_timeout)
            .with_datasource(config.layer_datasource(layer).cloned())
    }

    /// Evaluates a widget by name.
    ///
    /// # Errors
    ///
    /// `MapError::NotFound` for an unknown widget, the validation errors of
    /// [`Self::filtered_layer_sql`], or the executor's error.
    #[instrument(skip(self, config, request), fields(map = %config.id()))]
    pub async fn evaluate(
        &self,
        config: &MapConfig,
        name: &str,
        request: &WidgetRequest,
    ) -> Result<WidgetResult> {
        let (layer, def) = config.widget(name)?;
        self.run(config, layer, name, def, request).await
    }

    /// Evaluates a list widget by name.
    pub async fn list(
        &self,
        config: &MapConfig,
        name: &str,
        request: &WidgetRequest,
    ) -> Result<WidgetResult> {
        let (layer, def) = config.list(name)?;
        self.run(config, layer, name, def, request).await
    }

    async fn run(
        &self,
        config: &MapConfig,
        layer: usize,
        name: &str,
        def: &WidgetDef,
        request: &WidgetRequest,
    ) -> Result<WidgetResult> {
        let (widget, sql) = Self::build(config, layer, name, def, request)?;
        let options = self.query_options(config, layer);

        let result = self.executor.query(&sql, &options).await?;
        debug!(
            widget = name,
            kind = %widget.result_type(),
            rows = result.rows.len(),
            "Widget query complete"
        );
        Ok(widget.format(&result.rows, &request.overrides))
    }

    /// Searches the categories of an aggregation widget.
    ///
    /// The unfiltered and filtered searches run concurrently; if either
    /// fails the whole search fails.
    #[instrument(skip(self, config, request), fields(map = %config.id()))]
    pub async fn search(
        &self,
        config: &MapConfig,
        name: &str,
        user_query: &str,
        request: &WidgetRequest,
    ) -> Result<SearchResult> {
        let (layer, def) = config.widget(name)?;
        let Widget::Aggregation(widget) = Widget::new(def)? else {
            return Err(MapError::Config(format!(
                "Widget '{}' of type {} does not support search",
                name, def.kind
            )));
        };

        let unfiltered_sql = widget.build_search_query(config.layer_sql(layer)?, user_query);
        let exclude = (!request.own_filter).then_some(name);
        let filtered_sql = widget.build_search_query(
            &Self::filtered_layer_sql(config, layer, request, exclude)?,
            user_query,
        );
        let options = self.query_options(config, layer);

        let (unfiltered, filtered) = tokio::try_join!(
            self.executor.query(&unfiltered_sql, &options),
            self.executor.query(&filtered_sql, &options),
        )?;

        Ok(widget.merge_search(&unfiltered.rows, &filtered.rows))
    }
}
