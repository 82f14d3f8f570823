//! Application error types.

use thiserror::Error;

use crate::cache::TileCacheError;
use crate::error::MapError;

/// Errors that can occur during application start-up.
#[derive(Debug, Error)]
pub enum AppError {
    /// The tile cache could not be created.
    #[error("Failed to create tile cache: {0}")]
    Cache(#[from] TileCacheError),

    /// A built-in renderer backend could not be created.
    #[error("Failed to create renderer backend: {0}")]
    Backend(#[from] MapError),
}
