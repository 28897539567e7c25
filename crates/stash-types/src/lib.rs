//! Foundation types for Stash.
//!
//! Every other Stash crate depends on `stash-types`.
//!
//! # Key Types
//!
//! - [`Key`] -- Case-preserved identifier with a bijective filename encoding
//! - [`Value`] -- Arbitrary structured datum (scalar, sequence, or nested map)
//! - [`Map`] -- Nested mapping from key strings to values
//! - [`Fragment`] -- Single-root nested map produced by one unit of external work

pub mod error;
pub mod fragment;
pub mod key;

pub use error::TypeError;
pub use fragment::Fragment;
pub use key::Key;

/// An arbitrary structured value. No schema is enforced.
pub type Value = serde_json::Value;

/// A nested mapping from key strings to values.
pub type Map = serde_json::Map<String, Value>;
