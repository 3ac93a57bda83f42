//! Error types for StoreSync core.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by the schema registry and the entity store.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A type tag was not registered.
    #[error("unknown type: {name}")]
    UnknownType {
        /// The tag or client alias that failed to resolve.
        name: String,
    },

    /// A relation name is not declared on a type.
    #[error("unknown relation {relation} on {type_tag}")]
    UnknownRelation {
        /// The type that was searched.
        type_tag: String,
        /// The relation name that was not found.
        relation: String,
    },

    /// A type was registered twice.
    #[error("type already registered: {name}")]
    DuplicateType {
        /// The duplicated tag.
        name: String,
    },

    /// A schema declaration is internally inconsistent.
    #[error("invalid schema for {type_tag}: {message}")]
    InvalidSchema {
        /// The offending type.
        type_tag: String,
        /// Description of the problem.
        message: String,
    },

    /// Entity not found in the store.
    #[error("entity not found: {type_tag}#{id}")]
    EntityNotFound {
        /// The type searched.
        type_tag: String,
        /// The missing identifier.
        id: u64,
    },

    /// A join query names the same alias on both sides.
    #[error("ambiguous join: origin and related side are both aliased {alias}")]
    AmbiguousJoin {
        /// The colliding alias.
        alias: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// Snapshot could not be decoded.
    #[error("invalid snapshot: {message}")]
    InvalidSnapshot {
        /// Description of the problem.
        message: String,
    },
}

impl CoreError {
    /// Creates an unknown type error.
    pub fn unknown_type(name: impl Into<String>) -> Self {
        Self::UnknownType { name: name.into() }
    }

    /// Creates an unknown relation error.
    pub fn unknown_relation(type_tag: impl Into<String>, relation: impl Into<String>) -> Self {
        Self::UnknownRelation {
            type_tag: type_tag.into(),
            relation: relation.into(),
        }
    }

    /// Creates an invalid schema error.
    pub fn invalid_schema(type_tag: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSchema {
            type_tag: type_tag.into(),
            message: message.into(),
        }
    }

    /// Creates an entity not found error.
    pub fn entity_not_found(type_tag: impl Into<String>, id: u64) -> Self {
        Self::EntityNotFound {
            type_tag: type_tag.into(),
            id,
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates an invalid snapshot error.
    pub fn invalid_snapshot(message: impl Into<String>) -> Self {
        Self::InvalidSnapshot {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CoreError::entity_not_found("Book", 7);
        assert_eq!(err.to_string(), "entity not found: Book#7");

        let err = CoreError::unknown_relation("Book", "chapters");
        assert!(err.to_string().contains("chapters"));
    }
}
