//! Error taxonomy shared by every mapsmith component.
//!
//! Errors fall into two broad classes: client errors (a malformed map
//! configuration, filter parameters or tile address) and server errors
//! (SQL execution, rendering, pool exhaustion). Callers translate the class
//! into a transport-level status with [`MapError::is_client_error`].

use thiserror::Error;

use crate::coord::CoordError;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MapError>;

/// Errors surfaced by the tile and widget pipelines.
#[derive(Debug, Clone, Error)]
pub enum MapError {
    /// Malformed widget, filter or layer declaration, or an unsupported
    /// format for a layer type.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed bbox, range or tile coordinate input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The SQL executor rejected or failed a query.
    #[error("Query execution error: {0}")]
    QueryExecution(String),

    /// A single layer failed to render. `source` keeps the layer's own
    /// error when the failure did not originate in the renderer itself.
    #[error("Render error in layer {layer}: {message}")]
    Render {
        layer: usize,
        message: String,
        #[source]
        source: Option<Box<MapError>>,
    },

    /// Unknown widget, list or layer.
    #[error("Not found: {0}")]
    NotFound(String),

    /// No renderer was available for a pool key within the acquire timeout.
    #[error("Pool exhausted for key {key}: {in_use} resources in use")]
    PoolExhausted { key: String, in_use: usize },
}

impl MapError {
    /// Creates a render error for the given layer.
    pub fn render(layer: usize, message: impl Into<String>) -> Self {
        MapError::Render {
            layer,
            message: message.into(),
            source: None,
        }
    }

    /// Attributes an error to the layer that produced it. Render errors
    /// already name their layer and pass through unchanged.
    pub fn in_layer(layer: usize, error: MapError) -> Self {
        match error {
            MapError::Render { .. } => error,
            other => MapError::Render {
                layer,
                message: other.to_string(),
                source: Some(Box::new(other)),
            },
        }
    }

    /// True when the error was caused by the request rather than the server.
    pub fn is_client_error(&self) -> bool {
        match self {
            MapError::Config(_) | MapError::Validation(_) | MapError::NotFound(_) => true,
            MapError::Render {
                source: Some(source),
                ..
            } => source.is_client_error(),
            _ => false,
        }
    }
}

impl From<CoordError> for MapError {
    fn from(e: CoordError) -> Self {
        MapError::Validation(e.to_string())
    }
}

impl From<serde_json::Error> for MapError {
    fn from(e: serde_json::Error) -> Self {
        MapError::Config(e.to_string())
    }
}
