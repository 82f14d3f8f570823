//! `mapsmith config` - effective configuration.

use std::path::Path;

use clap::Subcommand;
use mapsmith::config::config_file_path;

use super::common::load_config_file;
use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration as INI
    Show,

    /// Show the configuration file path
    Path,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands, path: Option<&Path>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Show => {
            let config = load_config_file(path)?;
            print!("{}", config.to_config_string());
        }
        ConfigCommands::Path => {
            let path = path.map(Path::to_path_buf).unwrap_or_else(config_file_path);
            let state = if path.exists() { "" } else { " (not created, defaults in use)" };
            println!("{}{}", path.display(), state);
        }
    }
    Ok(())
}
