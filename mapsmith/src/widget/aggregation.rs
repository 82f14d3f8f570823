//! Aggregation (category) widget.
//!
//! Groups the filtered layer by a category column and ranks categories by
//! their aggregated value. The top [`MAX_CATEGORIES`] are returned
//! individually; the remainder collapse into a single `Other` row whose
//! value is the sum of the collapsed values, so the total is preserved.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{MapError, Result};
use crate::mapconfig::WidgetOptions;
use crate::sql::{quote_literal, row_bool, row_f64, row_i64, row_string, Row};

/// Categories returned individually before collapsing into `Other`.
pub const MAX_CATEGORIES: usize = 12;

/// Name of the collapsed category.
pub const OTHER_CATEGORY: &str = "Other";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl fmt::Display for AggregationFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Min => "min",
            Self::Max => "max",
        })
    }
}

impl FromStr for AggregationFunction {
    type Err = MapError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "count" => Ok(Self::Count),
            "sum" => Ok(Self::Sum),
            "avg" => Ok(Self::Avg),
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            other => Err(MapError::Config(format!(
                "Aggregation function '{}' is not valid",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationCategory {
    pub category: String,
    pub value: f64,
    /// True for the collapsed `Other` row.
    pub agg: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationResult {
    pub aggregation: AggregationFunction,
    /// Rows in the filtered layer.
    pub count: i64,
    pub nulls: i64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub categories_count: i64,
    pub categories: Vec<AggregationCategory>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchCategory {
    pub category: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub categories: Vec<SearchCategory>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregationWidget {
    column: String,
    aggregation: AggregationFunction,
    aggregation_column: Option<String>,
}

impl AggregationWidget {
    pub fn new(options: &WidgetOptions) -> Result<Self> {
        let column = options
            .column
            .clone()
            .ok_or_else(|| MapError::Config("Aggregation expects 'column' option".into()))?;
        let aggregation = match options.aggregation.as_deref() {
            Some(name) => name.parse()?,
            None => AggregationFunction::Count,
        };
        if aggregation != AggregationFunction::Count && options.aggregation_column.is_none() {
            return Err(MapError::Config(format!(
                "Aggregation function '{}' expects 'aggregationColumn' option",
                aggregation
            )));
        }
        Ok(Self {
            column,
            aggregation,
            aggregation_column: options.aggregation_column.clone(),
        })
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    fn aggregate_expression(&self) -> String {
        match (&self.aggregation, &self.aggregation_column) {
            (AggregationFunction::Count, _) => "count(1)".to_string(),
            (function, Some(column)) => format!("{}({})", function, column),
            (function, None) => format!("{}(1)", function),
        }
    }

    pub fn build_query(&self, query: &str) -> String {
        let column = &self.column;
        let aggregate = self.aggregate_expression();
        let limit = MAX_CATEGORIES;
        let other = quote_literal(OTHER_CATEGORY);

        format!(
            "WITH \
             _cdb_filtered_source AS ({query}), \
             _cdb_aggregation_nulls AS ( \
               SELECT count(*) AS nulls_count FROM _cdb_filtered_source WHERE {column} IS NULL \
             ), \
             _cdb_aggregation_all AS ( \
               SELECT {aggregate} AS value, {column} AS category \
               FROM _cdb_filtered_source WHERE {column} IS NOT NULL GROUP BY {column} \
             ), \
             _cdb_aggregation_stats AS ( \
               SELECT (SELECT count(*) FROM _cdb_filtered_source) AS count, \
               count(*) AS categories_count, min(value) AS min_val, max(value) AS max_val \
               FROM _cdb_aggregation_all \
             ), \
             _cdb_categories AS ( \
               SELECT category, value, row_number() OVER (ORDER BY value DESC, category) AS rank \
               FROM _cdb_aggregation_all \
             ) \
             SELECT CAST(category AS text) AS category, value, false AS agg, rank, \
               nulls_count, min_val, max_val, count, categories_count \
             FROM _cdb_categories, _cdb_aggregation_nulls, _cdb_aggregation_stats \
             WHERE rank <= {limit} \
             UNION ALL \
             SELECT {other} AS category, sum(value) AS value, true AS agg, {limit} + 1 AS rank, \
               nulls_count, min_val, max_val, count, categories_count \
             FROM _cdb_categories, _cdb_aggregation_nulls, _cdb_aggregation_stats \
             WHERE rank > {limit} \
             GROUP BY nulls_count, min_val, max_val, count, categories_count \
             ORDER BY rank"
        )
    }

    /// Query listing every category whose name matches `user_query`.
    pub fn build_search_query(&self, query: &str, user_query: &str) -> String {
        let pattern = quote_literal(&format!("%{}%", user_query));
        format!(
            "SELECT CAST({column} AS text) AS category, {aggregate} AS value \
             FROM ({query}) _cdb_aggregation_search \
             WHERE CAST({column} AS text) ILIKE {pattern} \
             GROUP BY {column} \
             ORDER BY value DESC",
            column = self.column,
            aggregate = self.aggregate_expression(),
        )
    }

    /// Formats category rows. Categories beyond the top
    /// [`MAX_CATEGORIES`] are folded into `Other` even if the executor
    /// returned them individually.
    pub fn format(&self, rows: &[Row]) -> AggregationResult {
        let first = rows.first();

        let mut named: Vec<AggregationCategory> = Vec::new();
        let mut other: Option<f64> = None;
        for row in rows {
            let value = row_f64(row, "value").unwrap_or(0.0);
            if row_bool(row, "agg").unwrap_or(false) {
                *other.get_or_insert(0.0) += value;
            } else {
                named.push(AggregationCategory {
                    category: row_string(row, "category").unwrap_or_default(),
                    value,
                    agg: false,
                });
            }
        }

        // Stable: ties keep the executor's category order
        named.sort_by(|a, b| b.value.total_cmp(&a.value));
        if named.len() > MAX_CATEGORIES {
            let collapsed: f64 = named.drain(MAX_CATEGORIES..).map(|c| c.value).sum();
            *other.get_or_insert(0.0) += collapsed;
        }
        if let Some(value) = other {
            named.push(AggregationCategory {
                category: OTHER_CATEGORY.to_string(),
                value,
                agg: true,
            });
        }

        AggregationResult {
            aggregation: self.aggregation,
            count: first.and_then(|r| row_i64(r, "count")).unwrap_or(0),
            nulls: first.and_then(|r| row_i64(r, "nulls_count")).unwrap_or(0),
            min: first.and_then(|r| row_f64(r, "min_val")),
            max: first.and_then(|r| row_f64(r, "max_val")),
            categories_count: first.and_then(|r| row_i64(r, "categories_count")).unwrap_or(0),
            categories: named,
        }
    }

    /// Merges filtered search values into the unfiltered category universe.
    /// Categories absent from the filtered rows get 0.
    pub fn merge_search(&self, unfiltered: &[Row], filtered: &[Row]) -> SearchResult {
        let filtered: HashMap<String, f64> = filtered
            .iter()
            .filter_map(|row| Some((row_string(row, "category")?, row_f64(row, "value")?)))
            .collect();

        let categories = unfiltered
            .iter()
            .filter_map(|row| row_string(row, "category"))
            .map(|category| SearchCategory {
                value: filtered.get(&category).copied().unwrap_or(0.0),
                category,
            })
            .collect();

        SearchResult { categories }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn widget(aggregation: Option<&str>, column: Option<&str>) -> AggregationWidget {
        AggregationWidget::new(&WidgetOptions {
            column: Some("country".into()),
            aggregation: aggregation.map(str::to_string),
            aggregation_column: column.map(str::to_string),
            ..WidgetOptions::default()
        })
        .unwrap()
    }

    fn category_row(category: &str, value: f64) -> Row {
        json!({
            "category": category, "value": value, "agg": false,
            "count": 100, "nulls_count": 4, "min_val": 1, "max_val": 50, "categories_count": 20
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn test_query_shape() {
        let sql = widget(Some("sum"), Some("pop")).build_query("select * from t");
        assert!(sql.contains("_cdb_filtered_source AS (select * from t)"));
        assert!(sql.contains("SELECT sum(pop) AS value, country AS category"));
        assert!(sql.contains("WHERE rank <= 12"));
        assert!(sql.contains("SELECT 'Other' AS category, sum(value) AS value, true AS agg"));
        assert!(sql.contains("WHERE country IS NULL"));
    }

    #[test]
    fn test_count_is_default() {
        let sql = widget(None, None).build_query("q");
        assert!(sql.contains("SELECT count(1) AS value"));
    }

    #[test]
    fn test_validation() {
        let missing_column = AggregationWidget::new(&WidgetOptions::default());
        assert!(matches!(missing_column, Err(MapError::Config(_))));

        let missing_agg_column = AggregationWidget::new(&WidgetOptions {
            column: Some("c".into()),
            aggregation: Some("sum".into()),
            ..WidgetOptions::default()
        });
        assert!(missing_agg_column.is_err());

        let bad_function = AggregationWidget::new(&WidgetOptions {
            column: Some("c".into()),
            aggregation: Some("median".into()),
            ..WidgetOptions::default()
        });
        assert!(bad_function.is_err());
    }

    #[test]
    fn test_format_reads_stats_and_other() {
        let mut other = category_row("Other", 7.0);
        other.insert("agg".into(), json!(true));
        let rows = vec![category_row("ES", 30.0), category_row("FR", 20.0), other];

        let result = widget(None, None).format(&rows);
        assert_eq!(result.count, 100);
        assert_eq!(result.nulls, 4);
        assert_eq!(result.min, Some(1.0));
        assert_eq!(result.max, Some(50.0));
        assert_eq!(result.categories_count, 20);
        assert_eq!(result.categories.len(), 3);
        assert_eq!(result.categories[2], AggregationCategory {
            category: "Other".into(),
            value: 7.0,
            agg: true,
        });
    }

    #[test]
    fn test_search_query_escapes_user_input() {
        let sql = widget(None, None).build_search_query("q", "d'or");
        assert!(sql.contains("ILIKE '%d''or%'"));
    }

    #[test]
    fn test_merge_search_fills_missing_with_zero() {
        let unfiltered = vec![category_row("ES", 30.0), category_row("FR", 20.0)];
        let filtered = vec![category_row("FR", 5.0)];

        let result = widget(None, None).merge_search(&unfiltered, &filtered);
        assert_eq!(
            result.categories,
            vec![
                SearchCategory { category: "ES".into(), value: 0.0 },
                SearchCategory { category: "FR".into(), value: 5.0 },
            ]
        );
    }

    proptest! {
        #[test]
        fn prop_collapse_preserves_total(values in proptest::collection::vec(0u32..10_000, 0..40)) {
            let rows: Vec<Row> = values
                .iter()
                .enumerate()
                .map(|(i, v)| category_row(&format!("c{i}"), f64::from(*v)))
                .collect();

            let result = widget(None, None).format(&rows);
            let expected: f64 = values.iter().map(|v| f64::from(*v)).sum();
            let total: f64 = result.categories.iter().map(|c| c.value).sum();

            prop_assert_eq!(total, expected);
            prop_assert!(result.categories.len() <= MAX_CATEGORIES + 1);
            let named = result.categories.iter().filter(|c| !c.agg).count();
            prop_assert_eq!(named, values.len().min(MAX_CATEGORIES));
        }
    }
}
