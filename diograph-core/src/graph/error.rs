//! Errors raised by entity and graph operations.

use thiserror::Error;

/// Precondition failures of graph operations.
///
/// Surfaced synchronously to the caller of the failing operation; never
/// retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// Lookup by key, id or edge target failed.
    #[error("{operation}: item not found {id:?}")]
    NotFound { operation: &'static str, id: String },

    /// Duplicate key or id on insert, or duplicate edge on add.
    #[error("{operation}: item already exists {id:?}")]
    AlreadyExists { operation: &'static str, id: String },

    /// A document entry could not be turned into an entity.
    #[error("{operation}: invalid entity {key:?}: {reason}")]
    InvalidEntity {
        operation: &'static str,
        key: String,
        reason: String,
    },
}

impl GraphError {
    pub(crate) fn not_found(operation: &'static str, id: impl Into<String>) -> Self {
        GraphError::NotFound {
            operation,
            id: id.into(),
        }
    }

    pub(crate) fn already_exists(operation: &'static str, id: impl Into<String>) -> Self {
        GraphError::AlreadyExists {
            operation,
            id: id.into(),
        }
    }

    /// Check if this is a `NotFound` error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, GraphError::NotFound { .. })
    }

    /// Check if this is an `AlreadyExists` error.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, GraphError::AlreadyExists { .. })
    }

    /// The operation that failed.
    pub fn operation(&self) -> &'static str {
        match self {
            GraphError::NotFound { operation, .. }
            | GraphError::AlreadyExists { operation, .. }
            | GraphError::InvalidEntity { operation, .. } => operation,
        }
    }
}
