//! # StoreSync Protocol
//!
//! Wire types for StoreSync.
//!
//! This crate provides:
//! - `SyncRequest`, the mutation/refresh/search batch a client sends
//! - `SyncResponse`, the merged snapshot returned to it
//! - `ErrorPayload`, the application-level error channel
//! - JSON encoding/decoding
//!
//! This is a pure protocol crate with no I/O operations. Field names are
//! camelCase on the wire.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod lenient;
mod request;
mod response;

pub use error::{ProtocolError, ProtocolResult};
pub use request::{
    CommitGroup, ModelIds, RelationChanges, RelationRead, RelationTarget, SearchQuery, SyncRequest,
};
pub use response::{
    ErrorDetail, ErrorKind, ErrorPayload, PageData, RelationIndexPayload, SyncResponse,
};
