//! Configuration for the sync engine.

/// Default suffix marking foreign-key attributes.
pub const DEFAULT_FOREIGN_KEY_SUFFIX: &str = "_id";

/// Configuration for request processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Attributes whose name ends with this suffix are foreign keys; a temp
    /// id in one of them is a deferred reference.
    pub foreign_key_suffix: String,
    /// Upper bound on search page sizes. An unlimited search is capped to it
    /// as well.
    pub max_page_size: Option<u64>,
}

impl EngineConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self {
            foreign_key_suffix: DEFAULT_FOREIGN_KEY_SUFFIX.to_string(),
            max_page_size: None,
        }
    }

    /// Sets the foreign-key suffix.
    pub fn with_foreign_key_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.foreign_key_suffix = suffix.into();
        self
    }

    /// Sets the maximum page size.
    pub fn with_max_page_size(mut self, size: u64) -> Self {
        self.max_page_size = Some(size);
        self
    }

    /// Returns true if `attribute` is named like a foreign key.
    pub fn is_foreign_key(&self, attribute: &str) -> bool {
        attribute.len() > self.foreign_key_suffix.len()
            && attribute.ends_with(&self.foreign_key_suffix)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}
