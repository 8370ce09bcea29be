//! Error types for cluster store operations

use std::fmt;

/// Result type alias for cluster store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while exchanging snapshots
#[derive(Debug)]
pub enum StoreError {
    /// The store could not be reached
    Unavailable(String),

    /// A write was refused by the store
    Rejected(String),

    /// Snapshot encoding or decoding failed
    Serialization(serde_json::Error),

    /// Store-specific failure
    Backend(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Unavailable(msg) => write!(f, "cluster store unavailable: {}", msg),
            StoreError::Rejected(msg) => write!(f, "cluster store rejected snapshot: {}", msg),
            StoreError::Serialization(err) => write!(f, "snapshot serialization error: {}", err),
            StoreError::Backend(msg) => write!(f, "cluster store error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Serialization(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err)
    }
}
