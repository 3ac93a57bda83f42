//! # StoreSync Server
//!
//! Request handling front for the StoreSync engine.
//!
//! This crate provides:
//! - JSON request decoding and response encoding
//! - Batch size limits checked before any store access
//! - A tracing span per request with a generated request id
//! - Request counters
//!
//! # Architecture
//!
//! The server owns one store and one engine. Authentication, HTTP routing
//! and transport belong to the embedding application: it authenticates the
//! caller, builds the [`Actor`](storesync_core::Actor) and passes the request
//! body to [`SyncServer::handle_json`].
//!
//! # Errors
//!
//! Two levels are kept apart:
//! 1. A body that does not decode is a [`ServerError::InvalidRequest`]
//! 2. A decoded request that fails is answered with an error payload, and
//!    nothing it wrote is committed

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;
mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, RequestHandler, ServerStats};
pub use server::SyncServer;
