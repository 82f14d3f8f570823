//! SQL executor abstraction.
//!
//! Widgets and filters only *build* SQL text; execution is delegated to an
//! external [`SqlExecutor`]. This keeps every template a pure function that
//! can be unit tested without a database, and lets tests inject canned rows.
//!
//! Identifiers and literal values are interpolated into the templates
//! without parameter binding. Column names come from the map configuration
//! and are trusted to have been validated upstream.

mod row;

pub use row::{row_bool, row_f64, row_i64, row_string, Row};

use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::Result;
use crate::mapconfig::Datasource;
use crate::BoxFuture;

/// Per-query execution options passed through to the executor.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Run the statement inside a read-only transaction.
    pub read_only: bool,
    /// Statement timeout. Interpreted by the executor, never by mapsmith.
    pub timeout: Option<Duration>,
    /// Layer datasource override, if the map configuration declares one.
    pub datasource: Option<Datasource>,
}

impl QueryOptions {
    /// Read-only options as used by every widget and filter query.
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_datasource(mut self, datasource: Option<Datasource>) -> Self {
        self.datasource = datasource;
        self
    }
}

/// Rows and column types returned by the executor.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub rows: Vec<Row>,
    /// Column name to database type name.
    pub fields: BTreeMap<String, String>,
}

impl QueryResult {
    pub fn from_rows(rows: Vec<Row>) -> Self {
        Self {
            rows,
            fields: BTreeMap::new(),
        }
    }
}

/// External SQL execution engine.
///
/// Implementations map driver failures to `MapError::QueryExecution`.
pub trait SqlExecutor: Send + Sync {
    fn query<'a>(
        &'a self,
        sql: &'a str,
        options: &'a QueryOptions,
    ) -> BoxFuture<'a, Result<QueryResult>>;
}

/// Quotes a string literal for inclusion in SQL text.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
