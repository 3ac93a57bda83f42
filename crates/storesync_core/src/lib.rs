//! # StoreSync Core
//!
//! Entity model, type schemas and the transactional store for StoreSync.
//!
//! This crate provides:
//! - Identifiers: persisted ids, client temp ids, type tags, actors
//! - Type schemas with relation metadata and eager declarations
//! - Capability scopes, validators and search providers per type
//! - The `EntityStore` interface and an in-memory implementation
//!
//! The sync engine is written against these interfaces only; the in-memory
//! store is the reference collaborator used by tests, the CLI and benches.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod entity;
mod error;
pub mod schema;
pub mod store;
mod types;

pub use entity::{Attributes, Entity, RESERVED_ATTRIBUTES};
pub use error::{CoreError, CoreResult};
pub use schema::{
    AllowAll, AttributeMatch, CapabilityScope, Cardinality, FieldErrors, JoinSide, NoValidation,
    OwnerScope, RelationKind, RelationMeta, RequiredAttributes, SchemaRegistry, ScopeDeclaration,
    SearchProvider, TypeDeclaration, TypeSchema, Validator,
};
pub use store::{
    EntityStore, JoinQuery, JoinRow, MemoryStore, MemoryTransaction, StoreSnapshot,
    StoreTransaction,
};
pub use types::{Actor, EntityId, EntityRef, Operation, TempId, TypeTag};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
