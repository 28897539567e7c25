use stash_store::StoreError;
use stash_types::Key;
use thiserror::Error;

/// Errors from cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A value was demanded for a key with no (fresh) entry.
    #[error("key not cached: {0}")]
    KeyNotCached(Key),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A cached value does not have the shape the caller asked for.
    #[error("cannot decode cached value for {key}: {reason}")]
    Decode { key: Key, reason: String },

    /// A computed value could not be converted for storage.
    #[error("cannot encode value for {key}: {reason}")]
    Encode { key: Key, reason: String },

    #[error("configuration error: {0}")]
    Config(String),
}

pub type CacheResult<T> = Result<T, CacheError>;
