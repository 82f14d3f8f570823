//! `mapsmith filter-sql` and `mapsmith widget-sql` - SQL composition
//! without a database.

use std::path::PathBuf;

use clap::Args;
use mapsmith::widget::WidgetEngine;

use super::common::{load_map_config, parse_request};
use crate::error::CliError;

#[derive(Debug, Args)]
pub struct FilterSqlArgs {
    /// Map configuration JSON
    #[arg(long)]
    pub config: PathBuf,

    /// Layer index
    #[arg(long)]
    pub layer: usize,

    /// Request JSON (`{"filters": {...}, "bbox": "w,s,e,n"}`) or @file
    #[arg(long)]
    pub params: Option<String>,
}

#[derive(Debug, Args)]
pub struct WidgetSqlArgs {
    /// Map configuration JSON
    #[arg(long)]
    pub config: PathBuf,

    /// Widget name
    #[arg(long)]
    pub widget: String,

    /// Request JSON (`{"filters": {...}, "bbox": ..., "overrides": {...}}`) or @file
    #[arg(long)]
    pub params: Option<String>,

    /// Apply the widget's own filter to its query
    #[arg(long)]
    pub own_filter: bool,
}

pub fn run_filter_sql(args: FilterSqlArgs) -> Result<(), CliError> {
    let config = load_map_config(&args.config)?;
    let request = parse_request(args.params.as_deref())?;

    let sql = WidgetEngine::filtered_layer_sql(&config, args.layer, &request, None)?;
    println!("{}", sql);
    Ok(())
}

pub fn run_widget_sql(args: WidgetSqlArgs) -> Result<(), CliError> {
    let config = load_map_config(&args.config)?;
    let mut request = parse_request(args.params.as_deref())?;
    request.own_filter |= args.own_filter;

    let (widget, sql) = WidgetEngine::widget_sql(&config, &args.widget, &request)?;
    println!("-- {} widget '{}'", widget.result_type(), args.widget);
    println!("{}", sql);
    Ok(())
}
