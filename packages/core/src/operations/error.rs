//! Error types for tree operations
//!
//! This module defines the failures a structural tree operation can surface.
//! Every failure leaves storage in its pre-operation state: the engine rolls
//! the transaction back before returning the error.

use crate::config::ConfigError;
use crate::db::DatabaseError;
use thiserror::Error;

/// Errors that can occur during tree operations
///
/// # Examples
///
/// ```rust
/// use nestedset_core::operations::TreeOperationError;
///
/// let err = TreeOperationError::circular_parent(5, 9);
/// assert!(err.to_string().contains("descendant"));
///
/// let err = TreeOperationError::node_not_found(42);
/// assert!(err.is_missing_node());
/// ```
#[derive(Error, Debug)]
pub enum TreeOperationError {
    /// The requested change would break a nested-set invariant
    ///
    /// Raised for re-parenting a node under itself or one of its descendants,
    /// moving or deleting the synthetic root, attaching a node twice, and
    /// operating on a node whose bounds are still unset.
    #[error("Tree invariant violation on node {node_id}: {reason}")]
    InvariantViolation { node_id: i64, reason: String },

    /// Referenced node does not exist (or is soft-deleted)
    #[error("Node {node_id} does not exist")]
    MissingNode { node_id: i64 },

    /// Configuration rejected at setup time
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    /// Underlying store failure, propagated after rollback
    #[error("Store failure: {0}")]
    Store(#[from] DatabaseError),

    /// A deferred command could not be handed to the task submitter
    #[error("Failed to dispatch tree command: {reason}")]
    Dispatch { reason: String },
}

impl TreeOperationError {
    pub fn invariant_violation(node_id: i64, reason: impl Into<String>) -> Self {
        Self::InvariantViolation {
            node_id,
            reason: reason.into(),
        }
    }

    /// New parent is the node itself or one of its descendants
    pub fn circular_parent(node_id: i64, new_parent_id: i64) -> Self {
        let reason = if node_id == new_parent_id {
            "a node cannot become its own parent".to_string()
        } else {
            format!(
                "new parent {} is a descendant of the node being moved",
                new_parent_id
            )
        };
        Self::InvariantViolation { node_id, reason }
    }

    pub fn root_is_immutable(root_id: i64, action: &str) -> Self {
        Self::InvariantViolation {
            node_id: root_id,
            reason: format!("the synthetic root cannot be {}", action),
        }
    }

    pub fn unpositioned(node_id: i64) -> Self {
        Self::InvariantViolation {
            node_id,
            reason: "node has no persisted bounds yet".to_string(),
        }
    }

    pub fn node_not_found(node_id: i64) -> Self {
        Self::MissingNode { node_id }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration(ConfigError::new(reason))
    }

    pub fn dispatch(reason: impl Into<String>) -> Self {
        Self::Dispatch {
            reason: reason.into(),
        }
    }

    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::InvariantViolation { .. })
    }

    pub fn is_missing_node(&self) -> bool {
        matches!(self, Self::MissingNode { .. })
    }

    /// Store failures are the only class a deferred worker may retry
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}
