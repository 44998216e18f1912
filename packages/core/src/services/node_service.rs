//! Tree Node Service
//!
//! Reference persistence layer for hierarchy records. It owns the record
//! lifecycle (insert, update, re-parent, delete) and raises the matching tree
//! command at each step:
//!
//! | Step | Command |
//! |------|---------|
//! | before insert | parent defaults to the root |
//! | after insert | `Created` |
//! | parent change | `ParentChanged` (stored parent kept until the move runs) |
//! | before delete | `Deleting` |
//!
//! Commands go through a [`TreeEventGateway`], so the same service works in
//! inline and deferred mode. In deferred mode a delete soft-deletes the record
//! first and queues the detach with [`Removal::Keep`].

use crate::config::TreeConfig;
use crate::db::{DatabaseService, NodeStore, Removal, TursoStore};
use crate::models::{NewTreeNode, TreeNode};
use crate::operations::{RebuildReport, TreeOperationError};
use crate::services::error::NodeServiceError;
use crate::services::gateway::{DispatchOutcome, TaskSubmitter, TreeCommand, TreeEventGateway};
use crate::services::TreeMutationEngine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Partial update of a record's own fields
///
/// Position fields are never part of an update; use
/// [`TreeNodeService::update_parent`] to move a record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNodeUpdate {
    pub name: Option<String>,
    pub properties: Option<Value>,
}

impl TreeNodeUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_properties(mut self, properties: Value) -> Self {
        self.properties = Some(properties);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.properties.is_none()
    }
}

/// Record lifecycle service for one hierarchy
///
/// # Examples
///
/// ```no_run
/// use nestedset_core::config::TreeConfig;
/// use nestedset_core::db::DatabaseService;
/// use nestedset_core::models::NewTreeNode;
/// use nestedset_core::services::TreeNodeService;
/// use std::path::PathBuf;
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let db = Arc::new(DatabaseService::new(PathBuf::from("./data/tree.db"), TreeConfig::default()).await?);
///     let service = TreeNodeService::new(db, None)?;
///
///     let books = service.create_node(NewTreeNode::new("Books")).await?;
///     let novels = service.create_node(NewTreeNode::new("Novels").under(books.id)).await?;
///     println!("{:?}", novels.depth);
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct TreeNodeService {
    store: Arc<dyn NodeStore>,
    gateway: Arc<TreeEventGateway>,
}

impl TreeNodeService {
    /// Create a service over the given database
    ///
    /// # Arguments
    ///
    /// * `db` - Database holding the configured hierarchy table
    /// * `submitter` - Task submitter for deferred mode (ignored otherwise)
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` tree error when deferral is configured
    /// without a submitter.
    pub fn new(
        db: Arc<DatabaseService>,
        submitter: Option<Arc<dyn TaskSubmitter>>,
    ) -> Result<Self, NodeServiceError> {
        let engine = Arc::new(TreeMutationEngine::new(db.clone()));
        let gateway = TreeEventGateway::new(engine, submitter)?;
        Ok(Self {
            store: Arc::new(TursoStore::new(db)),
            gateway: Arc::new(gateway),
        })
    }

    pub fn store(&self) -> &Arc<dyn NodeStore> {
        &self.store
    }

    pub fn engine(&self) -> &Arc<TreeMutationEngine> {
        self.gateway.engine()
    }

    fn config(&self) -> &TreeConfig {
        self.gateway.engine().config()
    }

    /// Live record by id, root included
    async fn live_node(&self, id: i64) -> Result<TreeNode, NodeServiceError> {
        self.store
            .get_node(id)
            .await?
            .filter(|n| !n.is_trashed())
            .ok_or_else(|| NodeServiceError::node_not_found(id))
    }

    /// Insert a record and attach it as the last child of its parent
    ///
    /// In inline mode the returned record carries its bounds. In deferred
    /// mode they stay unset until the queued `Created` command runs.
    ///
    /// # Errors
    ///
    /// - `InvalidParent` if the parent does not exist or is trashed
    /// - `TreeError` if attaching fails; the inserted row is removed again
    pub async fn create_node(&self, node: NewTreeNode) -> Result<TreeNode, NodeServiceError> {
        let parent_id = node.parent_id.unwrap_or(self.config().root_id);
        match self.store.get_node(parent_id).await? {
            Some(parent) if !parent.is_trashed() => {}
            _ => return Err(NodeServiceError::invalid_parent(parent_id)),
        }

        let created = self
            .store
            .create_node(&node.name, parent_id, &node.properties)
            .await?;

        if let Err(e) = self
            .gateway
            .dispatch(TreeCommand::Created { id: created.id })
            .await
        {
            tracing::warn!(
                "Removing node {} after failed attach: {}",
                created.id,
                e
            );
            self.store.delete_node(created.id).await?;
            return Err(e.into());
        }

        self.live_node(created.id).await
    }

    /// Record by id; trashed rows and the root are included
    pub async fn get_node(&self, id: i64) -> Result<Option<TreeNode>, NodeServiceError> {
        Ok(self.store.get_node(id).await?)
    }

    /// Update a record's name and properties
    pub async fn update_node(
        &self,
        id: i64,
        update: TreeNodeUpdate,
    ) -> Result<TreeNode, NodeServiceError> {
        if update.is_empty() {
            return Err(NodeServiceError::invalid_update("nothing to update"));
        }

        let existing = self.live_node(id).await?;
        let name = update.name.unwrap_or(existing.name);
        let properties = update.properties.unwrap_or(existing.properties);

        self.store
            .update_node(id, &name, &properties)
            .await?
            .ok_or_else(|| NodeServiceError::node_not_found(id))
    }

    /// Move a record under a new parent (`None` = root)
    ///
    /// Unchanged parents are a no-op. The stored `parent_id` is only written
    /// by the move itself, so in deferred mode the returned record still
    /// shows the old parent.
    pub async fn update_parent(
        &self,
        id: i64,
        new_parent_id: Option<i64>,
    ) -> Result<TreeNode, NodeServiceError> {
        let existing = self.live_node(id).await?;
        let target = new_parent_id.unwrap_or(self.config().root_id);
        if existing.parent_id == Some(target) {
            return Ok(existing);
        }

        self.gateway
            .dispatch(TreeCommand::ParentChanged {
                id,
                new_parent_id: Some(target),
            })
            .await?;

        self.live_node(id).await
    }

    /// Delete a record, promoting its children to its parent
    ///
    /// Returns `false` if the record does not exist or is already trashed.
    /// In soft-delete mode the row is kept with `deleted_at` set. If a
    /// deferred detach cannot be queued the record is restored and the
    /// dispatch error returned.
    pub async fn delete_node(&self, id: i64) -> Result<bool, NodeServiceError> {
        let root_id = self.config().root_id;
        if id == root_id {
            return Err(TreeOperationError::root_is_immutable(root_id, "deleted").into());
        }

        match self.store.get_node(id).await? {
            Some(node) if !node.is_trashed() => {}
            _ => return Ok(false),
        }

        if self.gateway.is_deferred() {
            // keep the row addressable for the queued detach
            self.store.soft_delete_node(id).await?;
            let outcome = match self
                .gateway
                .dispatch(TreeCommand::Deleting {
                    id,
                    removal: Removal::Keep,
                })
                .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!("Restoring node {} after failed detach dispatch: {}", id, e);
                    self.store.restore_node(id).await?;
                    return Err(e.into());
                }
            };
            if let DispatchOutcome::Queued(task_id) = outcome {
                tracing::debug!("Node {} soft-deleted, detach queued as {}", id, task_id);
            }
            return Ok(true);
        }

        let removal = if self.config().soft_delete {
            Removal::SoftDelete
        } else {
            Removal::Delete
        };
        self.gateway
            .dispatch(TreeCommand::Deleting { id, removal })
            .await?;
        Ok(true)
    }

    /// Recompute every position from parent links
    pub async fn fix_tree(&self) -> Result<RebuildReport, NodeServiceError> {
        Ok(self.engine().fix_tree().await?)
    }
}
