//! Mapsmith CLI - Command-line interface
//!
//! Inspect map configurations offline: tile math, the SQL that filters and
//! widgets would run, and tiles rendered with the built-in backends.

mod commands;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::{config, extent, sql, tile};

#[derive(Parser)]
#[command(name = "mapsmith")]
#[command(version = mapsmith::VERSION)]
#[command(about = "Map configuration, widget SQL and tile tools", long_about = None)]
struct Cli {
    /// Configuration file (default: ~/.mapsmith/config.ini)
    #[arg(long, global = true)]
    config_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the resolution and Web Mercator extent of a tile
    Extent(extent::ExtentArgs),

    /// Print a layer's query with its active filters applied
    FilterSql(sql::FilterSqlArgs),

    /// Print the SQL a widget would run
    WidgetSql(sql::WidgetSqlArgs),

    /// Render a tile with the built-in plain and http backends
    Tile(tile::TileArgs),

    /// Show the effective configuration
    Config {
        #[command(subcommand)]
        command: Option<config::ConfigCommands>,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Extent(args) => extent::run(args),
        Commands::FilterSql(args) => sql::run_filter_sql(args),
        Commands::WidgetSql(args) => sql::run_widget_sql(args),
        Commands::Tile(args) => tile::run(args, cli.config_file.as_deref()),
        Commands::Config { command } => config::run(
            command.unwrap_or(config::ConfigCommands::Show),
            cli.config_file.as_deref(),
        ),
    };

    if let Err(e) = result {
        e.exit();
    }
}

