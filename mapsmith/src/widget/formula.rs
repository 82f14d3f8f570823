//! Formula widget: a single aggregate over the filtered layer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{MapError, Result};
use crate::mapconfig::WidgetOptions;
use crate::sql::{row_f64, row_i64, Row};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormulaOperation {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl FormulaOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Min => "min",
            Self::Max => "max",
        }
    }
}

impl fmt::Display for FormulaOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormulaOperation {
    type Err = MapError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "count" => Ok(Self::Count),
            "sum" => Ok(Self::Sum),
            "avg" => Ok(Self::Avg),
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            other => Err(MapError::Config(format!(
                "Formula operation '{}' is not valid, expected one of count, sum, avg, min, max",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormulaResult {
    pub operation: FormulaOperation,
    /// `None` when the aggregate is undefined (e.g. `avg` of no rows).
    pub result: Option<f64>,
    pub nulls: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormulaWidget {
    operation: FormulaOperation,
    column: Option<String>,
    aggregate: String,
}

impl FormulaWidget {
    pub fn new(options: &WidgetOptions) -> Result<Self> {
        let operation: FormulaOperation = options
            .operation
            .as_deref()
            .ok_or_else(|| MapError::Config("Formula expects 'operation' option".into()))?
            .parse()?;

        let aggregate = match (operation, &options.column) {
            (FormulaOperation::Count, _) => "count(*)".to_string(),
            (op, Some(column)) => format!("{}({})", op, column),
            (op, None) => {
                return Err(MapError::Config(format!(
                    "Formula '{}' expects 'column' option",
                    op
                )))
            }
        };

        Ok(Self {
            operation,
            column: options.column.clone(),
            aggregate,
        })
    }

    pub fn operation(&self) -> FormulaOperation {
        self.operation
    }

    pub fn build_query(&self, query: &str) -> String {
        let nulls = match &self.column {
            Some(column) => format!(
                "(SELECT count(*) FROM ({}) _cdb_formula_nulls WHERE {} IS NULL)",
                query, column
            ),
            None => "0".to_string(),
        };

        format!(
            "SELECT {} AS result, {} AS nulls_count FROM ({}) _cdb_formula",
            self.aggregate, nulls, query
        )
    }

    pub fn format(&self, rows: &[Row]) -> FormulaResult {
        let row = rows.first();
        let result = row.and_then(|r| row_f64(r, "result"));
        let nulls = row.and_then(|r| row_i64(r, "nulls_count")).unwrap_or(0);

        FormulaResult {
            operation: self.operation,
            result: match (self.operation, result) {
                (FormulaOperation::Count, None) => Some(0.0),
                (_, result) => result,
            },
            nulls,
        }
    }
}
