//! Repository index for Stash.
//!
//! A crawler (or any other producer) reports discovered resources as
//! fragments. A [`RashLoader`] pulls every fragment from its
//! [`FragmentSource`], folds them into a [`Rash`], and can persist the result
//! through a [`stash_cache::Cache`] so later runs skip the crawl entirely.
//!
//! ```
//! use stash_rash::{Rash, RashLoader, ResourceRecord};
//!
//! let records = vec![
//!     ResourceRecord::from_url("http://repo.example/packages/AV/AV.ini").unwrap(),
//!     ResourceRecord::from_url("http://repo.example/packages/AV/AV.zip").unwrap(),
//! ];
//! let loader = RashLoader::new(records);
//! let rash: Rash = loader.load().unwrap();
//!
//! assert_eq!(rash.size(), 1);
//! assert!(rash.get("av").unwrap().get("zip").is_some());
//! ```

pub mod error;
pub mod rash;
pub mod record;
pub mod source;

pub use error::{RashError, RashResult};
pub use rash::{Rash, RashLoader};
pub use record::ResourceRecord;
pub use source::{FnSource, FragmentSource, Fragments, SourceError};
