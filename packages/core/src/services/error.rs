//! Service Layer Error Types
//!
//! This module defines error types for the record lifecycle service, wrapping
//! store and tree failures with record-level context.

use crate::db::DatabaseError;
use crate::operations::TreeOperationError;
use thiserror::Error;

/// Service operation errors
///
/// Provides high-level error types for record operations, with the tree and
/// store failures they were caused by chained underneath.
#[derive(Error, Debug)]
pub enum NodeServiceError {
    /// Node not found by ID
    #[error("Node not found: {id}")]
    NodeNotFound { id: i64 },

    /// Database operation failed
    #[error("Database operation failed: {0}")]
    DatabaseError(#[from] DatabaseError),

    /// Structural tree operation failed
    #[error("Tree operation failed: {0}")]
    TreeError(#[from] TreeOperationError),

    /// Invalid parent reference
    #[error("Invalid parent node: {parent_id}")]
    InvalidParent { parent_id: i64 },

    /// Invalid update operation
    #[error("Invalid update: {0}")]
    InvalidUpdate(String),
}

impl NodeServiceError {
    /// Create a node not found error
    pub fn node_not_found(id: i64) -> Self {
        Self::NodeNotFound { id }
    }

    /// Create an invalid parent error
    pub fn invalid_parent(parent_id: i64) -> Self {
        Self::InvalidParent { parent_id }
    }

    /// Create an invalid update error
    pub fn invalid_update(msg: impl Into<String>) -> Self {
        Self::InvalidUpdate(msg.into())
    }

    /// Whether the failure is a rejected structural change
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::TreeError(e) if e.is_invariant_violation())
    }
}
