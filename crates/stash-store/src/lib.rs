//! Key/value persistence for Stash.
//!
//! A store holds single values addressed by a single [`Key`]. It never
//! interprets the values it holds and offers no multi-key transactions.
//!
//! # Storage Backends
//!
//! All backends implement the [`Store`] trait:
//!
//! - [`DiskStore`] -- one framed file per key under a root directory, guarded
//!   by shared/exclusive locks
//! - [`InMemoryStore`] -- `HashMap`-based store for tests and embedding
//!
//! # Design Rules
//!
//! 1. A store never holds two entries for the same key.
//! 2. Writes replace the previous entry wholesale and are durable on return.
//! 3. Readers observe a complete prior write or absence, never a partial write.
//! 4. Torn or corrupt records read as absence and are logged, never returned.
//! 5. Unexpected I/O errors are propagated, never retried.
//!
//! [`Key`]: stash_types::Key

pub mod codec;
pub mod disk;
pub mod error;
mod lock;
pub mod memory;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use codec::{FrameError, JsonSerializer, Serializer};
pub use disk::DiskStore;
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryStore;
pub use traits::Store;
