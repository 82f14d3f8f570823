//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use std::fmt;
use std::process;

use mapsmith::app::AppError;
use mapsmith::config::ConfigFileError;
use mapsmith::MapError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration file error
    Config(ConfigFileError),
    /// Failed to read a map configuration or parameters file
    Input { path: String, error: std::io::Error },
    /// Invalid command-line arguments
    Args(String),
    /// Failed to start the application
    Startup(AppError),
    /// Map, widget or render error
    Map(MapError),
    /// Failed to write output file
    FileWrite { path: String, error: std::io::Error },
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        if let CliError::Map(e) = self {
            if e.is_client_error() {
                eprintln!();
                eprintln!("Check the map configuration and the --params JSON.");
            }
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(e) => write!(f, "{}", e),
            CliError::Input { path, error } => write!(f, "Failed to read '{}': {}", path, error),
            CliError::Args(msg) => write!(f, "Invalid arguments: {}", msg),
            CliError::Startup(e) => write!(f, "{}", e),
            CliError::Map(e) => write!(f, "{}", e),
            CliError::FileWrite { path, error } => {
                write!(f, "Failed to write file '{}': {}", path, error)
            }
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(e) => Some(e),
            CliError::Input { error, .. } => Some(error),
            CliError::Startup(e) => Some(e),
            CliError::Map(e) => Some(e),
            CliError::FileWrite { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e)
    }
}

impl From<AppError> for CliError {
    fn from(e: AppError) -> Self {
        CliError::Startup(e)
    }
}

impl From<MapError> for CliError {
    fn from(e: MapError) -> Self {
        CliError::Map(e)
    }
}
