//! Fixture files: type declarations plus a store snapshot.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use storesync_core::{CoreError, MemoryStore, SchemaRegistry, StoreSnapshot, TypeDeclaration};
use thiserror::Error;

/// Errors while reading or writing a fixture.
#[derive(Error, Debug)]
pub enum FixtureError {
    /// The file could not be read or written.
    #[error("{path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file is not valid fixture JSON.
    #[error("{path}: {source}")]
    Json {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },

    /// The declarations or the snapshot are inconsistent.
    #[error("invalid fixture: {0}")]
    Invalid(#[from] CoreError),
}

/// Contents of a fixture file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    /// Declared types.
    pub types: Vec<TypeDeclaration>,
    /// Store contents.
    #[serde(default)]
    pub store: StoreSnapshot,
}

impl Fixture {
    /// Reads a fixture file.
    pub fn load(path: &Path) -> Result<Self, FixtureError> {
        let bytes = std::fs::read(path).map_err(|source| FixtureError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| FixtureError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Writes the fixture as indented JSON.
    pub fn save(&self, path: &Path) -> Result<(), FixtureError> {
        let bytes = serde_json::to_vec_pretty(self).map_err(|source| FixtureError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, bytes).map_err(|source| FixtureError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Builds and validates the registry of the declared types.
    pub fn registry(&self) -> Result<SchemaRegistry, FixtureError> {
        let mut registry = SchemaRegistry::new();
        for declaration in &self.types {
            registry.register(declaration.clone().into_schema())?;
        }
        registry.validate()?;
        Ok(registry)
    }

    /// Loads the snapshot into a memory store.
    pub fn memory_store(&self) -> Result<MemoryStore, FixtureError> {
        Ok(MemoryStore::from_snapshot(self.store.clone())?)
    }
}
