//! # StoreSync Engine
//!
//! Batch reconciliation engine for StoreSync.
//!
//! This crate provides:
//! - Typed decoding of a sync request into a mutation batch
//! - Dependency ordering of creates that reference each other by temp id
//! - Scoped persistence with deferred foreign key back-fill
//! - Idempotent relation additions and removals
//! - Eager relation expansion guarded by a visited set
//! - Paged search and response assembly
//!
//! ## Architecture
//!
//! A request runs as a fixed sequence of stages inside one store transaction:
//! 1. Resolve and persist creates and updates, recording the temp id mapping
//! 2. Destroy
//! 3. Add and remove relation members
//! 4. Read requested relations
//! 5. Refresh everything touched, plus requested ids, with eager expansion
//! 6. Run searches and expand the requested page
//!
//! Every read and write goes through the actor's capability scope.
//!
//! ## Key Invariants
//!
//! - A request is atomic: any error rolls back every stage
//! - No create is persisted before the temp ids it references
//! - No (type, id) pair is expanded twice within a request
//! - The response never lists the same (type, id) twice

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod assembler;
mod batch;
mod config;
mod eager;
mod error;
mod executor;
mod relations;
mod resolver;
mod scope;
mod search;
mod session;

pub use assembler::{error_response, ResponseAssembler};
pub use batch::{
    to_snake_case, Deletion, MutationBatch, Refresh, RelationChange, RelationReadCommand,
    Search, Upsert,
};
pub use config::{EngineConfig, DEFAULT_FOREIGN_KEY_SUFFIX};
pub use eager::{EagerLoader, Expansion, RelationIndex, RelationIndexSet};
pub use error::{SyncError, SyncResult};
pub use executor::{CommitOutcome, IdMapping, PersistenceExecutor};
pub use relations::RelationMutator;
pub use resolver::{plan, CommitPlan, DependencyGraph, ForeignKeyDeferral};
pub use scope::ScopedQuery;
pub use search::{Pagination, SearchOutcome};
pub use session::SyncEngine;
