//! Error types for the toolgate core library.

use thiserror::Error;

/// Result type alias using the toolgate core `Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for toolgate operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unknown auto-approve level or risk level name
    #[error("Invalid level: {0}")]
    InvalidLevel(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
