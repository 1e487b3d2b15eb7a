//! Common error types for AZPlay

use thiserror::Error;

/// Common result type for AZPlay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the AZPlay crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Catalog document could not be parsed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Cut record violates its timer invariants
    #[error("Invalid cut {id}: {reason}")]
    InvalidCut { id: String, reason: String },

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),
}
