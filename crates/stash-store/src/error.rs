use stash_types::{Key, TypeError};

use crate::codec::FrameError;

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested key has no entry.
    #[error("key not found: {0}")]
    NotFound(Key),

    /// The backing record exists but cannot be decoded.
    #[error("corrupt entry {key}: {reason}")]
    Corrupt { key: Key, reason: String },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The key cannot be represented by this backend.
    #[error(transparent)]
    InvalidKey(#[from] TypeError),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub(crate) fn corrupt(key: &Key, err: FrameError) -> Self {
        Self::Corrupt {
            key: key.clone(),
            reason: err.to_string(),
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
