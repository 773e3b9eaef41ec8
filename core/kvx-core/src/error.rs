//! Error types for the kvx store layer.
//!
//! All public APIs return `KvxResult<T>`; no panics in library code.

use thiserror::Error;

/// Unified error type for all kvx operations.
#[derive(Debug, Error)]
pub enum KvxError {
    /// Requested key does not exist
    #[error("key not found")]
    KeyNotFound,

    /// A stored value no longer decodes with the configured codec
    #[error("corrupted value: {0}")]
    Corruption(String),

    /// Engine failure that is not covered by a more specific variant
    #[error("storage error: {0}")]
    Storage(String),

    /// sled embedded database error
    #[error("sled error: {source}")]
    Sled {
        #[from]
        source: sled::Error,
    },

    /// Standard I/O error
    #[error("io error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Invalid store configuration
    #[error("config error: {0}")]
    Config(String),

    /// Invalid arguments
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The store has been closed
    #[error("store is closed")]
    Closed,
}

impl KvxError {
    /// Whether this error is the engine's "key not found" signal.
    pub fn is_not_found(&self) -> bool {
        matches!(self, KvxError::KeyNotFound)
    }
}

/// Result type alias for all kvx operations.
pub type KvxResult<T> = Result<T, KvxError>;

impl From<serde_json::Error> for KvxError {
    fn from(err: serde_json::Error) -> Self {
        KvxError::Serialization(err.to_string())
    }
}
