//! # StoreSync Testkit
//!
//! Test utilities for StoreSync.
//!
//! This crate provides:
//! - The library fixture schema and seeding helpers
//! - Property-based generators for dependency graphs using proptest
//! - An engine-plus-store harness and temporary fixture files
//!
//! ## Usage
//!
//! ```rust,ignore
//! use storesync_testkit::prelude::*;
//!
//! #[test]
//! fn refresh_pulls_in_the_author() {
//!     let (harness, seed) = SyncHarness::library();
//!     let request = SyncRequest::default().with_refresh("book", "Book", [1]);
//!     let response = harness.apply(Actor::anonymous(), &request);
//!     assert_eq!(response.ids_of("Author"), vec![1]);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
    pub use storesync_core::{Actor, EntityId, TypeTag};
    pub use storesync_protocol::{SyncRequest, SyncResponse};
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
