//! Error types for the sync engine.

use storesync_core::{CoreError, EntityId, EntityRef, FieldErrors, Operation, TempId};
use storesync_protocol::ErrorKind;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that abort a sync request.
///
/// Every variant is fatal: the request's transaction is rolled back and the
/// response carries only the error.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The actor's capability scope excludes the entity.
    #[error("no {operation} permission on {type_tag}#{id}")]
    PermissionDenied {
        /// Type of the entity.
        type_tag: String,
        /// The denied operation.
        operation: Operation,
        /// The entity.
        id: EntityId,
    },

    /// An entity failed validation.
    #[error("validation failed for {type_tag} {identity}")]
    ValidationFailed {
        /// Type of the entity.
        type_tag: String,
        /// The entity's id or temp id.
        identity: EntityRef,
        /// Field-level errors.
        errors: FieldErrors,
    },

    /// Temp id references form a cycle.
    #[error("dependency cycle between temp ids {}", join_temp_ids(.temp_ids))]
    DependencyCycle {
        /// Temp ids on the cycle(s), in batch order.
        temp_ids: Vec<TempId>,
    },

    /// A referenced entity or temp id does not exist.
    #[error("{type_tag} {reference} not found")]
    NotFound {
        /// Type named by the reference.
        type_tag: String,
        /// The missing reference.
        reference: EntityRef,
    },

    /// The same temp id was used twice in one batch.
    #[error("temp id {cid} used more than once ({type_tag})")]
    DuplicateTempId {
        /// Type of the second occurrence.
        type_tag: String,
        /// The duplicated temp id.
        cid: TempId,
    },

    /// A type name is not registered.
    #[error("unknown type: {name}")]
    UnknownType {
        /// The unresolved name.
        name: String,
    },

    /// A relation is not declared on a type.
    #[error("unknown relation {relation} on {type_tag}")]
    UnknownRelation {
        /// The type.
        type_tag: String,
        /// The relation name.
        relation: String,
    },

    /// The request is structurally invalid.
    #[error("invalid request: {message}")]
    InvalidRequest {
        /// Description of the problem.
        message: String,
    },

    /// The store failed.
    #[error("store error: {0}")]
    Store(CoreError),
}

fn join_temp_ids(temp_ids: &[TempId]) -> String {
    temp_ids
        .iter()
        .map(TempId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

impl SyncError {
    /// Creates an invalid request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(type_tag: impl Into<String>, reference: impl Into<EntityRef>) -> Self {
        Self::NotFound {
            type_tag: type_tag.into(),
            reference: reference.into(),
        }
    }

    /// Creates a permission denied error.
    pub fn permission_denied(type_tag: impl Into<String>, operation: Operation, id: EntityId) -> Self {
        Self::PermissionDenied {
            type_tag: type_tag.into(),
            operation,
            id,
        }
    }

    /// Returns the wire classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            SyncError::ValidationFailed { .. } => ErrorKind::ValidationFailed,
            SyncError::DependencyCycle { .. } => ErrorKind::DependencyCycle,
            SyncError::NotFound { .. } => ErrorKind::NotFound,
            SyncError::DuplicateTempId { .. } => ErrorKind::DuplicateTempId,
            SyncError::UnknownType { .. } => ErrorKind::UnknownType,
            SyncError::UnknownRelation { .. } => ErrorKind::UnknownRelation,
            SyncError::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            SyncError::Store(_) => ErrorKind::Internal,
        }
    }

    /// Returns the type the error is about, if any.
    pub fn type_tag(&self) -> Option<&str> {
        match self {
            SyncError::PermissionDenied { type_tag, .. }
            | SyncError::ValidationFailed { type_tag, .. }
            | SyncError::NotFound { type_tag, .. }
            | SyncError::DuplicateTempId { type_tag, .. }
            | SyncError::UnknownRelation { type_tag, .. } => Some(type_tag),
            SyncError::UnknownType { name } => Some(name),
            _ => None,
        }
    }
}

impl From<CoreError> for SyncError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::UnknownType { name } => SyncError::UnknownType { name },
            CoreError::UnknownRelation { type_tag, relation } => {
                SyncError::UnknownRelation { type_tag, relation }
            }
            CoreError::EntityNotFound { type_tag, id } => SyncError::NotFound {
                type_tag,
                reference: EntityRef::Persisted(EntityId(id)),
            },
            other => SyncError::Store(other),
        }
    }
}
