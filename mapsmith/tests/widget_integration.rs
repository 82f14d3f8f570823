//! Integration tests for widget evaluation.
//!
//! A routing SQL executor answers by matching fragments of the generated
//! statement, and records every statement with its options so the tests can
//! check filter composition and read-only execution.
//!
//! Run with: `cargo test --test widget_integration`

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};

use mapsmith::filter::FilterParams;
use mapsmith::mapconfig::MapConfig;
use mapsmith::sql::{QueryOptions, QueryResult, Row, SqlExecutor};
use mapsmith::widget::{FormulaOperation, WidgetEngine, WidgetRequest, WidgetResult};
use mapsmith::{BoxFuture, MapError, Result};

// ============================================================================
// Helper Functions
// ============================================================================

struct Route {
    needle: &'static str,
    response: Result<Vec<Row>>,
}

#[derive(Default)]
struct RoutingExecutor {
    routes: Vec<Route>,
    statements: Mutex<Vec<(String, QueryOptions)>>,
}

impl RoutingExecutor {
    fn route(mut self, needle: &'static str, rows: Vec<Value>) -> Self {
        let rows = rows
            .into_iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect();
        self.routes.push(Route {
            needle,
            response: Ok(rows),
        });
        self
    }

    fn fail(mut self, needle: &'static str, error: MapError) -> Self {
        self.routes.push(Route {
            needle,
            response: Err(error),
        });
        self
    }

    fn statements(&self) -> Vec<String> {
        self.statements.lock().iter().map(|(s, _)| s.clone()).collect()
    }
}

impl SqlExecutor for RoutingExecutor {
    fn query<'a>(
        &'a self,
        sql: &'a str,
        options: &'a QueryOptions,
    ) -> BoxFuture<'a, Result<QueryResult>> {
        Box::pin(async move {
            self.statements.lock().push((sql.to_string(), options.clone()));
            let route = self.routes.iter().find(|r| sql.contains(r.needle));
            match route.map(|r| &r.response) {
                Some(Ok(rows)) => Ok(QueryResult::from_rows(rows.clone())),
                Some(Err(e)) => Err(e.clone()),
                None => Ok(QueryResult::default()),
            }
        })
    }
}

/// Evaluates formula statements over a one-column in-memory table.
///
/// Understands just enough of the generated SQL to answer `count(*)` and
/// the nulls subquery, so the count comes from the data rather than a
/// canned row.
struct TableExecutor {
    values: Vec<Option<f64>>,
    statements: Mutex<Vec<String>>,
}

impl SqlExecutor for TableExecutor {
    fn query<'a>(
        &'a self,
        sql: &'a str,
        _options: &'a QueryOptions,
    ) -> BoxFuture<'a, Result<QueryResult>> {
        Box::pin(async move {
            self.statements.lock().push(sql.to_string());
            if !sql.starts_with("SELECT count(*) AS result,") {
                return Err(MapError::QueryExecution(format!("unsupported statement: {sql}")));
            }
            let nulls = if sql.contains(", 0 AS nulls_count") {
                0
            } else {
                self.values.iter().filter(|v| v.is_none()).count()
            };
            let row = json!({ "result": self.values.len(), "nulls_count": nulls });
            Ok(QueryResult::from_rows(vec![row.as_object().cloned().unwrap()]))
        })
    }
}

fn map_config() -> MapConfig {
    MapConfig::from_json(
        &json!({
            "layers": [{
                "type": "mapnik",
                "options": {
                    "sql": "select * from populated_places",
                    "cartocss": "#layer { marker-width: 4; }",
                    "widgets": {
                        "places": { "type": "formula", "options": { "operation": "count" } },
                        "pop_sum": {
                            "type": "formula",
                            "options": { "operation": "sum", "column": "pop_max" }
                        },
                        "country": {
                            "type": "aggregation",
                            "options": { "column": "adm0name", "aggregation": "count" }
                        },
                        "pop": {
                            "type": "histogram",
                            "options": { "column": "pop_max", "bins": 4 }
                        },
                        "names": {
                            "type": "list",
                            "options": { "columns": ["name", "pop_max"] }
                        }
                    }
                }
            }],
            "datasource": { "0": { "dbname": "analytics" } }
        })
        .to_string(),
    )
    .unwrap()
}

// ============================================================================
// Integration Tests
// ============================================================================

/// A count formula runs read-only with the layer datasource and timeout.
#[tokio::test]
async fn test_formula_count_end_to_end() {
    let executor = Arc::new(
        RoutingExecutor::default().route("_cdb_formula", vec![json!({ "result": 7, "nulls_count": 0 })]),
    );
    let engine = WidgetEngine::new(executor.clone()).with_query_timeout(Some(Duration::from_secs(2)));

    let result = engine
        .evaluate(&map_config(), "places", &WidgetRequest::default())
        .await
        .unwrap();

    match result {
        WidgetResult::Formula(formula) => {
            assert_eq!(formula.operation, FormulaOperation::Count);
            assert_eq!(formula.result, Some(7.0));
            assert_eq!(formula.nulls, 0);
        }
        other => panic!("expected formula result, got {other:?}"),
    }

    let statements = executor.statements.lock();
    let (sql, options) = &statements[0];
    assert!(sql.contains("count(*)"));
    assert!(sql.contains("select * from populated_places"));
    assert!(options.read_only);
    assert_eq!(options.timeout, Some(Duration::from_secs(2)));
    assert_eq!(
        options.datasource.as_ref().and_then(|d| d.dbname.as_deref()),
        Some("analytics")
    );
}

/// A column-less count over five rows, one of them null, reports all five
/// rows and no nulls.
#[tokio::test]
async fn test_formula_count_over_rows_with_a_null() {
    let executor = Arc::new(TableExecutor {
        values: vec![Some(1.0), Some(2.0), None, Some(4.0), Some(5.0)],
        statements: Mutex::new(Vec::new()),
    });
    let engine = WidgetEngine::new(executor.clone());

    let result = engine
        .evaluate(&map_config(), "places", &WidgetRequest::default())
        .await
        .unwrap();

    match result {
        WidgetResult::Formula(formula) => {
            assert_eq!(formula.operation, FormulaOperation::Count);
            assert_eq!(formula.result, Some(5.0));
            assert_eq!(formula.nulls, 0);
        }
        other => panic!("expected formula result, got {other:?}"),
    }

    let statements = executor.statements.lock();
    assert_eq!(statements.len(), 1);
    assert!(statements[0].starts_with("SELECT count(*) AS result, 0 AS nulls_count"));
    assert!(!statements[0].contains("IS NULL"));
}

/// Other widgets' filters apply; the widget's own filter does not unless
/// requested.
#[tokio::test]
async fn test_own_filter_semantics() {
    let executor = Arc::new(RoutingExecutor::default());
    let engine = WidgetEngine::new(executor.clone());
    let config = map_config();

    let mut request = WidgetRequest::default();
    request
        .filters
        .insert("country".into(), FilterParams::accept(vec![json!("Spain")]));
    request
        .filters
        .insert("pop".into(), FilterParams::range(Some(1000.0), None));

    engine.evaluate(&config, "country", &request).await.unwrap();
    request.own_filter = true;
    engine.evaluate(&config, "country", &request).await.unwrap();

    let statements = executor.statements();
    assert!(statements[0].contains("pop_max > 1000"));
    assert!(!statements[0].contains("'Spain'"));
    assert!(statements[1].contains("adm0name IN ('Spain')"));
}

/// A request bbox filters every widget query, split at the antimeridian.
#[tokio::test]
async fn test_bbox_applies_to_widget_queries() {
    let executor = Arc::new(RoutingExecutor::default());
    let engine = WidgetEngine::new(executor.clone());

    let request = WidgetRequest {
        bbox: Some("170,-10,190,10".into()),
        ..WidgetRequest::default()
    };
    engine.evaluate(&map_config(), "pop_sum", &request).await.unwrap();

    let sql = &executor.statements()[0];
    assert!(sql.contains("_cdb_bbox_filter"));
    assert!(sql.contains(" OR "));
    assert!(sql.contains("ST_MakeEnvelope(170, -10, 180, 10, 4326)"));
    assert!(sql.contains("ST_MakeEnvelope(-180, -10, -170, 10, 4326)"));
}

/// Histogram buckets are dense even when the executor skips empty ones.
#[tokio::test]
async fn test_histogram_fills_missing_bins() {
    let row = |bin: i64, freq: i64| {
        json!({
            "bins_start": 0.0, "bin_width": 25.0, "bins_number": 4, "nulls_count": 1,
            "bin": bin, "freq": freq, "min": 25.0 * bin as f64, "max": 25.0 * bin as f64 + 20.0,
            "avg": 25.0 * bin as f64 + 10.0,
        })
    };
    let executor = Arc::new(RoutingExecutor::default().route("WIDTH_BUCKET", vec![row(0, 3), row(3, 1)]));
    let engine = WidgetEngine::new(executor);

    let result = engine
        .evaluate(&map_config(), "pop", &WidgetRequest::default())
        .await
        .unwrap();

    let WidgetResult::Histogram(histogram) = result else {
        panic!("expected histogram result");
    };
    let freqs: Vec<i64> = histogram.bins.iter().map(|b| b.freq).collect();
    assert_eq!(freqs, vec![3, 0, 0, 1]);
    assert_eq!(histogram.nulls, 1);
    for pair in histogram.bins.windows(2) {
        assert_eq!(pair[0].end, pair[1].start);
    }
}

/// Invalid histogram overrides are rejected before any query runs.
#[tokio::test]
async fn test_invalid_overrides_rejected_eagerly() {
    let executor = Arc::new(RoutingExecutor::default());
    let engine = WidgetEngine::new(executor.clone());

    let mut request = WidgetRequest::default();
    request.overrides.start = Some(10.0);
    request.overrides.end = Some(5.0);

    let err = engine.evaluate(&map_config(), "pop", &request).await.unwrap_err();
    assert!(matches!(err, MapError::Validation(_)));
    assert!(executor.statements().is_empty());
}

/// Aggregation keeps the top categories and folds the rest into Other.
#[tokio::test]
async fn test_aggregation_other_preserves_sum() {
    let mut rows: Vec<Value> = (0..15)
        .map(|i| {
            json!({
                "category": format!("c{:02}", i), "value": (20 - i) as f64, "agg": false,
                "count": 200, "nulls_count": 0, "min_val": 6.0, "max_val": 20.0,
                "categories_count": 15,
            })
        })
        .collect();
    rows.reverse();
    let total: f64 = (0..15).map(|i| (20 - i) as f64).sum();

    let executor = Arc::new(RoutingExecutor::default().route("_cdb_", rows));
    let engine = WidgetEngine::new(executor);

    let result = engine
        .evaluate(&map_config(), "country", &WidgetRequest::default())
        .await
        .unwrap();

    let WidgetResult::Aggregation(aggregation) = result else {
        panic!("expected aggregation result");
    };
    assert_eq!(aggregation.categories.len(), 13);
    assert_eq!(aggregation.categories[0].category, "c00");
    let other = aggregation.categories.last().unwrap();
    assert!(other.agg);
    assert_eq!(other.category, "Other");
    let sum: f64 = aggregation.categories.iter().map(|c| c.value).sum();
    assert_eq!(sum, total);
    assert_eq!(aggregation.categories_count, 15);
}

/// Search merges filtered counts into the unfiltered universe.
#[tokio::test]
async fn test_search_merges_filtered_into_unfiltered() {
    let executor = Arc::new(
        RoutingExecutor::default()
            .route(
                "_cdb_range_filter",
                vec![json!({ "category": "Spain", "value": 2 })],
            )
            .route(
                "_cdb_aggregation_search",
                vec![
                    json!({ "category": "Spain", "value": 9 }),
                    json!({ "category": "Sweden", "value": 4 }),
                ],
            ),
    );
    let engine = WidgetEngine::new(executor.clone());

    let mut request = WidgetRequest::default();
    request
        .filters
        .insert("pop".into(), FilterParams::range(None, Some(5e5)));

    let result = engine
        .search(&map_config(), "country", "s", &request)
        .await
        .unwrap();

    let pairs: Vec<(&str, f64)> = result
        .categories
        .iter()
        .map(|c| (c.category.as_str(), c.value))
        .collect();
    assert_eq!(pairs, vec![("Spain", 2.0), ("Sweden", 0.0)]);
    assert_eq!(executor.statements().len(), 2);
}

/// Either failing search query fails the whole search.
#[tokio::test]
async fn test_search_fails_if_either_query_fails() {
    let executor = Arc::new(
        RoutingExecutor::default()
            .fail("_cdb_range_filter", MapError::QueryExecution("canceling statement".into())),
    );
    let engine = WidgetEngine::new(executor);

    let mut request = WidgetRequest::default();
    request
        .filters
        .insert("pop".into(), FilterParams::range(Some(1.0), Some(2.0)));

    let err = engine
        .search(&map_config(), "country", "sp", &request)
        .await
        .unwrap_err();
    assert!(matches!(err, MapError::QueryExecution(_)));
}

/// Lists project their columns; unknown names are not found.
#[tokio::test]
async fn test_list_and_not_found() {
    let executor = Arc::new(RoutingExecutor::default().route(
        "_cdb_list",
        vec![json!({ "name": "Madrid", "pop_max": 5_567_000 })],
    ));
    let engine = WidgetEngine::new(executor.clone());
    let config = map_config();

    let result = engine.list(&config, "names", &WidgetRequest::default()).await.unwrap();
    let WidgetResult::List(list) = result else {
        panic!("expected list result");
    };
    assert_eq!(list.rows.len(), 1);
    assert!(executor.statements()[0].starts_with("SELECT name, pop_max FROM"));

    let err = engine.list(&config, "places", &WidgetRequest::default()).await.unwrap_err();
    assert!(matches!(err, MapError::NotFound(_)));
    let err = engine
        .evaluate(&config, "missing", &WidgetRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, MapError::NotFound(_)));
}
