//! Deep-merge engine for Stash.
//!
//! Folds an ordered sequence of single-root [`Fragment`]s into one nested
//! map. Nested maps are unioned recursively; where both sides hold a value
//! that is not a map, the most recently observed fragment wins.
//!
//! Folding is order-sensitive only at conflicting leaves. Fragment order is
//! discovery order, which producers need not keep stable across runs.
//!
//! [`Fragment`]: stash_types::Fragment

pub mod deep;

pub use deep::{deep_merge, merge_fragments, merge_values, FragmentFolder};
