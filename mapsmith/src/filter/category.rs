//! Category (accept/reject) filter.

use serde_json::Value;

use crate::error::{MapError, Result};
use crate::sql::quote_literal;

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryFilter {
    column: String,
    accept: Vec<String>,
    reject: Vec<String>,
}

impl CategoryFilter {
    /// # Errors
    ///
    /// Returns `MapError::Validation` when both lists are empty or a value
    /// is neither a string nor a number.
    pub fn new(column: impl Into<String>, accept: &[Value], reject: &[Value]) -> Result<Self> {
        if accept.is_empty() && reject.is_empty() {
            return Err(MapError::Validation(
                "Category filter expects at least one value in accept or reject".into(),
            ));
        }
        Ok(Self {
            column: column.into(),
            accept: literals(accept)?,
            reject: literals(reject)?,
        })
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn sql(&self, query: &str) -> String {
        let mut clauses = Vec::with_capacity(2);
        if !self.accept.is_empty() {
            clauses.push(format!("{} IN ({})", self.column, self.accept.join(",")));
        }
        if !self.reject.is_empty() {
            clauses.push(format!("{} NOT IN ({})", self.column, self.reject.join(",")));
        }
        format!(
            "SELECT * FROM ({}) _cdb_category_filter WHERE {}",
            query,
            clauses.join(" AND ")
        )
    }
}

/// Numbers are emitted bare, strings quoted.
fn literals(values: &[Value]) -> Result<Vec<String>> {
    values
        .iter()
        .map(|value| match value {
            Value::Number(n) => Ok(n.to_string()),
            Value::String(s) => Ok(quote_literal(s)),
            other => Err(MapError::Validation(format!(
                "Category filter values must be strings or numbers, got {}",
                other
            ))),
        })
        .collect()
}
