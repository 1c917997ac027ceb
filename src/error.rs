//! Error types for the node store.

use thiserror::Error;

/// Main error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A concurrent commit claimed a contested path first. Retryable: the
    /// caller should re-read and re-derive the change against a fresh base
    /// revision. No partial state from the losing commit is ever visible.
    #[error("Commit conflict: {0}")]
    Conflict(String),

    #[error("Malformed revision string: {0:?}")]
    MalformedRevision(String),

    /// A structural change was rejected during translation, before any
    /// document write was attempted.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Backing-store failure. Fatal to the in-flight operation; the store
    /// performs no internal retry.
    #[error("Storage unavailable: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Store is disposed")]
    Disposed,
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
