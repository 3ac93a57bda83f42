//! Cross-crate integration test helpers.

use crate::fixtures::{library_registry, library_store, LibrarySeed};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use storesync_core::{Actor, MemoryStore, SchemaRegistry, StoreSnapshot};
use storesync_engine::{EngineConfig, SyncEngine};
use storesync_protocol::{SyncRequest, SyncResponse};
use tempfile::TempDir;

/// An engine paired with an in-memory store.
pub struct SyncHarness {
    /// The engine.
    pub engine: SyncEngine,
    /// The store every request runs against.
    pub store: MemoryStore,
}

impl SyncHarness {
    /// Creates a harness over an empty store.
    pub fn new(registry: SchemaRegistry) -> Self {
        Self {
            engine: SyncEngine::new(registry).expect("registry is valid"),
            store: MemoryStore::new(),
        }
    }

    /// Creates a harness over the seeded library.
    pub fn library() -> (Self, LibrarySeed) {
        let (store, seed) = library_store();
        let harness = Self {
            engine: SyncEngine::new(library_registry()).expect("library registry is valid"),
            store,
        };
        (harness, seed)
    }

    /// Replaces the engine configuration.
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.engine = self.engine.with_config(config);
        self
    }

    /// Processes a request as `actor`.
    pub fn apply(&self, actor: Actor, request: &SyncRequest) -> SyncResponse {
        self.engine.process(&self.store, actor, request)
    }

    /// Processes a request written as JSON as `actor`.
    pub fn apply_json(&self, actor: Actor, request: Value) -> SyncResponse {
        let request: SyncRequest =
            serde_json::from_value(request).expect("request JSON decodes");
        self.apply(actor, &request)
    }

    /// Exports the committed store state.
    pub fn snapshot(&self) -> StoreSnapshot {
        self.store.snapshot()
    }
}

/// A temporary directory for file-based tests.
pub struct FixtureDir {
    dir: TempDir,
}

impl FixtureDir {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Path of a file inside the directory.
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Writes `value` as pretty JSON and returns the file's path.
    pub fn write_json(&self, name: &str, value: &impl Serialize) -> PathBuf {
        let path = self.path(name);
        let bytes = serde_json::to_vec_pretty(value).expect("value serializes");
        std::fs::write(&path, bytes).expect("Failed to write fixture file");
        path
    }

    /// Reads a JSON file back.
    pub fn read_json(&self, name: &str) -> Value {
        let bytes = std::fs::read(self.path(name)).expect("Failed to read fixture file");
        serde_json::from_slice(&bytes).expect("fixture file holds JSON")
    }
}

impl Default for FixtureDir {
    fn default() -> Self {
        Self::new()
    }
}
