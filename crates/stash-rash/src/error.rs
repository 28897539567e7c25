use stash_cache::CacheError;
use stash_types::TypeError;
use thiserror::Error;

use crate::source::SourceError;

#[derive(Debug, Error)]
pub enum RashError {
    /// The fragment source failed; nothing was merged or cached.
    #[error("fragment source failed: {0}")]
    Source(#[source] SourceError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("fragment error: {0}")]
    Fragment(#[from] TypeError),
}

pub type RashResult<T> = Result<T, RashError>;
