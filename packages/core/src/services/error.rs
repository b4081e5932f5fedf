//! Service Layer Error Types
//!
//! This module defines error types for service-layer operations: access
//! control failures, tree-shape corruption, missing nodes and rule violations,
//! plus wrapped validation and storage errors.

use crate::db::DatabaseError;
use crate::models::ValidationError;
use thiserror::Error;

/// Service operation errors
#[derive(Error, Debug)]
pub enum NodeServiceError {
    /// The session lacks the privileges it asked for
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The tree is inconsistent: a missing ancestor, a node without owner,
    /// or no free placeholder path
    #[error("Tree corrupt: {0}")]
    StructuralCorruption(String),

    /// Node not found by id, path, name or user
    #[error("Not found: {0}")]
    NotFound(String),

    /// A rule of the tree was violated (duplicate path, empty privilege
    /// request, reserved name, ...)
    #[error("Constraint violated: {0}")]
    ConstraintViolation(String),

    /// Validation failed for node
    #[error("Node validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),

    /// Database operation failed
    #[error("Database operation failed: {0}")]
    DatabaseError(DatabaseError),
}

impl From<DatabaseError> for NodeServiceError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::UniqueViolation { path } => {
                Self::ConstraintViolation(format!("path already exists: {}", path))
            }
            other => Self::DatabaseError(other),
        }
    }
}

impl NodeServiceError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    /// Structural corruption is logged at error level when raised.
    pub fn structural_corruption(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::error!("Tree corrupt: {}", msg);
        Self::StructuralCorruption(msg)
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn constraint_violation(msg: impl Into<String>) -> Self {
        Self::ConstraintViolation(msg.into())
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_violation_surfaces_as_constraint_violation() {
        let err: NodeServiceError = DatabaseError::unique_violation("/r/x").into();
        assert!(matches!(err, NodeServiceError::ConstraintViolation(ref m) if m.contains("/r/x")));

        let err: NodeServiceError = DatabaseError::sql_execution("boom").into();
        assert!(matches!(err, NodeServiceError::DatabaseError(_)));
    }
}
