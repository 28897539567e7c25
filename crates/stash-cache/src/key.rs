//! Call-site keys.
//!
//! Code that caches "its own" result can name the entry after the function
//! doing the caching instead of threading an explicit key through the
//! program:
//!
//! ```
//! use stash_cache::{operation_key, Key};
//!
//! fn package_index() -> Key {
//!     operation_key!()
//! }
//!
//! assert_eq!(package_index(), Key::from("package_index"));
//! ```
//!
//! Only the final path segment is used, so two functions with the same name
//! in different modules share one entry. Pass an explicit key when that is
//! not wanted.

use stash_types::Key;

/// Expands to a [`Key`] holding the name of the enclosing function.
///
/// The name is resolved at compile time. Closures are skipped, so a call
/// inside a closure yields the name of the function containing the closure.
#[macro_export]
macro_rules! operation_key {
    () => {{
        fn __stash_here() {}
        fn __stash_type_name<T>(_: T) -> &'static str {
            ::std::any::type_name::<T>()
        }
        $crate::key::key_from_type_path(__stash_type_name(__stash_here))
    }};
}

/// Derive an operation key from the type path of a function item declared
/// inside the operation.
#[doc(hidden)]
pub fn key_from_type_path(path: &str) -> Key {
    let mut segments: Vec<&str> = path.split("::").collect();
    // The marker item itself.
    segments.pop();
    while segments
        .last()
        .is_some_and(|segment| segment.starts_with("{{"))
    {
        segments.pop();
    }
    Key::new(segments.last().copied().unwrap_or(path))
}
