//! Cache facade for Stash.
//!
//! A [`Cache`] wraps a [`Store`] with fetch-or-compute semantics: a value is
//! produced once per key and read back on every later request, across runs
//! when the store is on disk.
//!
//! # Components
//!
//! - [`Cache`] -- explicit or call-site keyed fetch, compute-or-fetch, expiry
//! - [`operation_key!`] -- compile-time key naming the enclosing function
//! - [`Memo`] / [`Memoizer`] -- in-process, at-most-once evaluation per owner
//! - [`StashConfig`] -- backend, root directory, and expiry settings
//!
//! No global cache exists: callers construct a `Cache` and pass it to the
//! code that needs it.
//!
//! [`Store`]: stash_store::Store

pub mod cache;
pub mod config;
pub mod error;
pub mod key;
pub mod memo;

pub use cache::Cache;
pub use config::{BackendKind, HostProbe, RootProbe, StashConfig};
pub use error::{CacheError, CacheResult};
pub use memo::{Memo, Memoizer};
pub use stash_types::Key;
