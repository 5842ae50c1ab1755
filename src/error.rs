//! Error types for the cache backends
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type shared by every cache backend.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key is absent or its item has expired
    #[error("Key not found")]
    Miss,

    /// Write was rejected by the backend
    #[error("Data not stored")]
    NotStored,

    /// Operation is not available on this backend
    #[error("Operation not supported")]
    NotSupported,

    /// Value could not be encoded
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Stored bytes could not be decoded into the requested shape
    #[error("Decoding error: {0}")]
    Decoding(String),

    /// Filesystem failure other than a missing entry
    #[error("Filesystem error: {0}")]
    Filesystem(#[from] std::io::Error),

    /// Backend cannot operate with the given setup
    #[error("Misconfiguration: {0}")]
    Misconfiguration(String),

    /// Key cannot be carried by the backend's protocol
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Remote cache client failure
    #[error("Backend error: {0}")]
    Backend(String),

    /// No adapter registered under this name
    #[error("Unknown adapter name {0:?}")]
    UnknownAdapter(String),

    /// Adapter name registered twice
    #[error("Adapter {0:?} is already registered")]
    AdapterExists(String),
}

impl CacheError {
    /// Returns true for the recoverable "no usable value" outcome.
    pub fn is_miss(&self) -> bool {
        matches!(self, CacheError::Miss)
    }
}

// == Result Type Alias ==
/// Convenience Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
