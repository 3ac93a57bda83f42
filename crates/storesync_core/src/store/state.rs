//! Transaction state.

use crate::entity::Attributes;
use crate::error::{CoreError, CoreResult};
use std::fmt;

/// Identifier of a store transaction, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(pub u64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

/// State of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is active and can perform operations.
    Active,
    /// Transaction has been committed.
    Committed,
    /// Transaction has been rolled back.
    RolledBack,
}

impl TransactionState {
    /// Ensures the transaction is active.
    pub fn ensure_active(self) -> CoreResult<()> {
        match self {
            Self::Active => Ok(()),
            Self::Committed => Err(CoreError::invalid_operation(
                "transaction already committed",
            )),
            Self::RolledBack => Err(CoreError::invalid_operation(
                "transaction already rolled back",
            )),
        }
    }
}

/// A write buffered in a transaction until commit.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingWrite {
    /// Insert or update an entity.
    Put(Attributes),
    /// Delete an entity.
    Delete,
}
