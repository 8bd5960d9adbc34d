//! Error types for templog.
//!
//! All errors use `thiserror` for ergonomic error handling and proper error chains.

use crate::codec::{DecodeError, TimeParseError};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for templog operations.
pub type Result<T> = std::result::Result<T, TemplogError>;

/// Main error type for templog.
#[derive(Error, Debug)]
pub enum TemplogError {
    // Per-line errors
    #[error("Malformed log line: {reason}")]
    Decode { reason: String },

    #[error("Invalid timestamp {value:?}: {reason}")]
    TimeParse { value: String, reason: String },

    // Catalog errors
    #[error("Invalid sensor id {sensor_id:?}: must match [A-Za-z_][A-Za-z0-9_]* (max 64 chars)")]
    InvalidSensorId { sensor_id: String },

    #[error("Sensor table not found: {sensor_id}")]
    TableNotFound { sensor_id: String },

    #[error("Failed to create table for sensor {sensor_id}: {reason}")]
    TableCreationFailed { sensor_id: String, reason: String },

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Database migration failed: {reason}")]
    MigrationFailed { reason: String },

    // File system errors
    #[error("File read error: {path:?}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Configuration errors
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TemplogError {
    /// Create an Internal error from any error type.
    pub fn internal(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<DecodeError> for TemplogError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::InvalidSensorId(sensor_id) => Self::InvalidSensorId { sensor_id },
            other => Self::Decode { reason: other.to_string() },
        }
    }
}

impl From<TimeParseError> for TemplogError {
    fn from(err: TimeParseError) -> Self {
        Self::TimeParse { value: err.value, reason: err.reason }
    }
}
