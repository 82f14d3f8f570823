//! List widget: projects a fixed set of columns.

use serde::Serialize;

use crate::error::{MapError, Result};
use crate::mapconfig::WidgetOptions;
use crate::sql::Row;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListResult {
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListWidget {
    columns: Vec<String>,
}

impl ListWidget {
    pub fn new(options: &WidgetOptions) -> Result<Self> {
        match &options.columns {
            Some(columns) if !columns.is_empty() => Ok(Self {
                columns: columns.clone(),
            }),
            _ => Err(MapError::Config("List expects 'columns' option".into())),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn build_query(&self, query: &str) -> String {
        format!("SELECT {} FROM ({}) _cdb_list", self.columns.join(", "), query)
    }

    pub fn format(&self, rows: &[Row]) -> ListResult {
        ListResult {
            rows: rows.to_vec(),
        }
    }
}
