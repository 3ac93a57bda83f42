//! Server configuration.

use storesync_engine::EngineConfig;

/// Configuration for the sync server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Maximum number of committed and destroyed rows per request.
    pub max_commit_entities: usize,
    /// Maximum number of searches per request.
    pub max_search_requests: usize,
    /// Engine configuration.
    pub engine: EngineConfig,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new() -> Self {
        Self {
            max_commit_entities: 1000,
            max_search_requests: 32,
            engine: EngineConfig::default(),
        }
    }

    /// Sets the maximum number of committed and destroyed rows.
    pub fn with_max_commit_entities(mut self, max: usize) -> Self {
        self.max_commit_entities = max;
        self
    }

    /// Sets the maximum number of searches.
    pub fn with_max_search_requests(mut self, max: usize) -> Self {
        self.max_search_requests = max;
        self
    }

    /// Sets the engine configuration.
    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}
