//! Error handling for the fitting store

use thiserror::Error;

/// Result type for fitstore
pub type Result<T> = std::result::Result<T, StoreError>;

/// Storage errors
///
/// Cloneable so a single failed fetch can be handed to every reader that
/// shared it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Record or blob does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Backend unreachable, I/O failure or non-success status
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// Path segment outside `[A-Za-z0-9_-]+`
    #[error("Invalid storage path segment: {0:?}")]
    InvalidPath(String),

    /// Stored payload is not valid JSON for the expected shape
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => StoreError::NotFound(err.to_string()),
            _ => StoreError::Unavailable(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}
