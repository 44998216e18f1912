//! Tree Mutation Engine
//!
//! Runs attach, relocate, detach and rebuild against storage. Each operation
//! is one `BEGIN IMMEDIATE` transaction on its own connection:
//!
//! 1. re-read the persisted position of every row involved (in-memory values
//!    held by the caller are never trusted)
//! 2. validate and compute the plan with the interval core
//! 3. apply the plan through the position repository
//! 4. commit, or roll back on any failure
//!
//! On failure nothing is written and the caller's record is not touched.
//!
//! # Lifecycle Hooks
//!
//! Callers with their own persistence layer drive the engine through
//! [`on_created`](TreeMutationEngine::on_created),
//! [`on_parent_changed`](TreeMutationEngine::on_parent_changed) and
//! [`on_before_delete`](TreeMutationEngine::on_before_delete), which also
//! write the refreshed position back into the in-memory record.

use crate::config::TreeConfig;
use crate::db::{DatabaseService, PositionRecord, PositionRepository, Removal};
use crate::models::{Position, PositionedNode};
use crate::operations::{
    compute_positions, AttachPlan, DetachPlan, RebuildReport, RelocatePlan, TreeOperationError,
};
use crate::services::gateway::TreeCommand;
use libsql::Connection;
use std::sync::Arc;

/// Structural operations on one configured hierarchy
#[derive(Debug, Clone)]
pub struct TreeMutationEngine {
    repository: PositionRepository,
}

impl TreeMutationEngine {
    pub fn new(db: Arc<DatabaseService>) -> Self {
        Self {
            repository: PositionRepository::new(db),
        }
    }

    pub fn config(&self) -> &TreeConfig {
        self.repository.config()
    }

    pub fn repository(&self) -> &PositionRepository {
        &self.repository
    }

    /// Commit on success, roll back on failure
    async fn finish<T>(
        &self,
        conn: &Connection,
        result: Result<T, TreeOperationError>,
    ) -> Result<T, TreeOperationError> {
        match result {
            Ok(value) => {
                self.repository.commit(conn).await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = self.repository.rollback(conn).await {
                    tracing::error!("Rollback failed after '{}': {}", e, rollback_err);
                }
                Err(e)
            }
        }
    }

    /// Live row by id, or `MissingNode`
    async fn fetch_live(
        &self,
        conn: &Connection,
        id: i64,
    ) -> Result<PositionRecord, TreeOperationError> {
        match self.repository.fetch(conn, id).await? {
            Some(record) if !record.trashed => Ok(record),
            _ => Err(TreeOperationError::node_not_found(id)),
        }
    }

    /// Live, positioned row by id
    async fn fetch_positioned(
        &self,
        conn: &Connection,
        id: i64,
    ) -> Result<Position, TreeOperationError> {
        self.fetch_live(conn, id)
            .await?
            .position()
            .ok_or_else(|| TreeOperationError::unpositioned(id))
    }

    //
    // ATTACH
    //

    /// Position a freshly inserted row as the last child of its parent
    ///
    /// A missing parent defaults to the root.
    ///
    /// # Errors
    ///
    /// - `MissingNode` if the row or its parent does not exist (or is trashed)
    /// - `InvariantViolation` if the row already has bounds
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use nestedset_core::config::TreeConfig;
    /// # use nestedset_core::db::DatabaseService;
    /// # use nestedset_core::services::TreeMutationEngine;
    /// # use std::path::PathBuf;
    /// # use std::sync::Arc;
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let db = Arc::new(DatabaseService::new(PathBuf::from("./tree.db"), TreeConfig::default()).await?);
    /// let id = db.db_insert_node("Books", 1, "{}").await?;
    /// let engine = TreeMutationEngine::new(db);
    /// let position = engine.attach(id).await?;
    /// assert_eq!((position.lft, position.rgt, position.depth), (2, 3, 1));
    /// # Ok(())
    /// # }
    /// ```
    pub async fn attach(&self, node_id: i64) -> Result<Position, TreeOperationError> {
        let conn = self.repository.begin().await?;
        let result = self.attach_in(&conn, node_id).await;
        self.finish(&conn, result).await
    }

    async fn attach_in(
        &self,
        conn: &Connection,
        node_id: i64,
    ) -> Result<Position, TreeOperationError> {
        let node = self.fetch_live(conn, node_id).await?;
        if node.lft.is_some() || node.rgt.is_some() {
            return Err(TreeOperationError::invariant_violation(
                node_id,
                "node is already attached",
            ));
        }

        let parent_id = node.parent_id.unwrap_or(self.config().root_id);
        let parent = self.fetch_positioned(conn, parent_id).await?;

        let plan = AttachPlan::compute(node_id, parent_id, &parent);
        self.repository.open_gap(conn, plan.gap_at).await?;
        self.repository
            .save_position_quietly(conn, node_id, &plan.position)
            .await?;

        tracing::debug!(
            "Attached node {} under {} at ({}, {}) depth {}",
            node_id,
            parent_id,
            plan.position.lft,
            plan.position.rgt,
            plan.position.depth
        );

        Ok(plan.position)
    }

    //
    // RELOCATE
    //

    /// Move a node and its subtree under a new parent (`None` = root)
    ///
    /// The node becomes the new parent's last child.
    ///
    /// # Errors
    ///
    /// - `InvariantViolation` for the root, for the node itself or one of
    ///   its descendants as new parent, or for unpositioned rows
    /// - `MissingNode` if the node or the new parent does not exist
    pub async fn relocate(
        &self,
        node_id: i64,
        new_parent_id: Option<i64>,
    ) -> Result<Position, TreeOperationError> {
        let conn = self.repository.begin().await?;
        let result = self.relocate_in(&conn, node_id, new_parent_id).await;
        self.finish(&conn, result).await
    }

    async fn relocate_in(
        &self,
        conn: &Connection,
        node_id: i64,
        new_parent_id: Option<i64>,
    ) -> Result<Position, TreeOperationError> {
        let root_id = self.config().root_id;
        if node_id == root_id {
            return Err(TreeOperationError::root_is_immutable(root_id, "moved"));
        }

        let new_parent_id = new_parent_id.unwrap_or(root_id);
        if new_parent_id == node_id {
            return Err(TreeOperationError::circular_parent(node_id, new_parent_id));
        }

        let node = self.fetch_positioned(conn, node_id).await?;
        let parent = self.fetch_positioned(conn, new_parent_id).await?;

        let plan = RelocatePlan::compute(node_id, &node, new_parent_id, &parent)?;
        if !plan.is_noop() {
            self.repository.relocate(conn, &plan).await?;
        }
        self.repository
            .set_parent(conn, node_id, new_parent_id)
            .await?;

        tracing::debug!(
            "Relocated node {} under {}: {:?} range [{}, {}) shift {} distance {} depth {:+}",
            node_id,
            new_parent_id,
            plan.direction,
            plan.range.start,
            plan.range.end,
            plan.shift,
            plan.distance,
            plan.depth_change
        );

        self.fetch_positioned(conn, node_id).await
    }

    //
    // DETACH
    //

    /// Remove a node from the hierarchy, promoting its children
    ///
    /// The row's own bounds are cleared and the row itself is then handled
    /// according to `removal` in the same transaction. Trashed rows can still
    /// be detached so a deferred delete can run after the record was
    /// soft-deleted.
    ///
    /// # Errors
    ///
    /// - `InvariantViolation` for the root or an unpositioned row
    /// - `MissingNode` if the row does not exist
    /// - `Configuration` for `Removal::SoftDelete` without soft-delete mode
    pub async fn detach(&self, node_id: i64, removal: Removal) -> Result<(), TreeOperationError> {
        if removal == Removal::SoftDelete && !self.config().soft_delete {
            return Err(TreeOperationError::configuration(
                "soft delete removal requires soft-delete mode",
            ));
        }

        let conn = self.repository.begin().await?;
        let result = self.detach_in(&conn, node_id, removal).await;
        self.finish(&conn, result).await
    }

    async fn detach_in(
        &self,
        conn: &Connection,
        node_id: i64,
        removal: Removal,
    ) -> Result<(), TreeOperationError> {
        let root_id = self.config().root_id;
        if node_id == root_id {
            return Err(TreeOperationError::root_is_immutable(root_id, "deleted"));
        }

        let node = self
            .repository
            .fetch(conn, node_id)
            .await?
            .ok_or_else(|| TreeOperationError::node_not_found(node_id))?;
        let position = node
            .position()
            .ok_or_else(|| TreeOperationError::unpositioned(node_id))?;

        let plan = DetachPlan::compute(node_id, &position);
        self.repository.detach(conn, &plan).await?;
        self.repository.remove(conn, node_id, removal).await?;

        tracing::debug!(
            "Detached node {} at ({}, {}), children promoted to {}, removal {:?}",
            node_id,
            plan.lft,
            plan.rgt,
            plan.parent_id,
            removal
        );

        Ok(())
    }

    //
    // REBUILD
    //

    /// Recompute every position from parent links
    ///
    /// Covers live rows and trashed rows still waiting for their detach.
    /// Rows unreachable from the root are left untouched and reported.
    pub async fn fix_tree(&self) -> Result<RebuildReport, TreeOperationError> {
        let conn = self.repository.begin().await?;
        let result = self.fix_tree_in(&conn).await;
        self.finish(&conn, result).await
    }

    async fn fix_tree_in(&self, conn: &Connection) -> Result<RebuildReport, TreeOperationError> {
        let records = self.repository.fetch_hierarchy(conn).await?;
        let config = self.config();

        let plan = compute_positions(records, config.root_id, config.root_parent_sentinel)?;
        self.repository.write_positions(conn, &plan.changed).await?;

        let report = plan.report();
        if !report.orphans.is_empty() {
            tracing::warn!(
                "Rebuild of '{}' left {} orphaned node(s) untouched: {:?}",
                config.table,
                report.orphans.len(),
                report.orphans
            );
        }
        tracing::info!(
            "Rebuilt '{}': {} positioned, {} updated",
            config.table,
            report.positioned,
            report.updated
        );

        Ok(report)
    }

    //
    // COMMANDS AND HOOKS
    //

    /// Run one tree command synchronously
    ///
    /// Returns the node's new position for `Created` and `ParentChanged`.
    pub async fn execute(
        &self,
        command: &TreeCommand,
    ) -> Result<Option<Position>, TreeOperationError> {
        match *command {
            TreeCommand::Created { id } => self.attach(id).await.map(Some),
            TreeCommand::ParentChanged { id, new_parent_id } => {
                self.relocate(id, new_parent_id).await.map(Some)
            }
            TreeCommand::Deleting { id, removal } => self.detach(id, removal).await.map(|_| None),
        }
    }

    /// Re-read the four position columns into an in-memory record
    pub async fn refresh_position<N>(&self, node: &mut N) -> Result<(), TreeOperationError>
    where
        N: PositionedNode + Send,
    {
        let conn = self.repository.database().connect_with_timeout().await?;
        let record = self
            .repository
            .fetch(&conn, node.node_id())
            .await?
            .ok_or_else(|| TreeOperationError::node_not_found(node.node_id()))?;

        node.set_parent_id(record.parent_id);
        node.set_lft(record.lft);
        node.set_rgt(record.rgt);
        node.set_depth(record.depth);
        Ok(())
    }

    /// Attach a record after its base row was committed
    pub async fn on_created<N>(&self, node: &mut N) -> Result<(), TreeOperationError>
    where
        N: PositionedNode + Send,
    {
        let position = self.attach(node.node_id()).await?;
        node.apply_position(&position);
        Ok(())
    }

    /// Relocate a record whose parent changed
    pub async fn on_parent_changed<N>(
        &self,
        node: &mut N,
        new_parent_id: Option<i64>,
    ) -> Result<(), TreeOperationError>
    where
        N: PositionedNode + Send,
    {
        let position = self.relocate(node.node_id(), new_parent_id).await?;
        node.apply_position(&position);
        Ok(())
    }

    /// Detach a record before the caller removes it
    pub async fn on_before_delete<N>(&self, node: &N) -> Result<(), TreeOperationError>
    where
        N: PositionedNode + Sync,
    {
        self.detach(node.node_id(), Removal::Keep).await
    }
}

#[cfg(test)]
#[path = "tree_engine_test.rs"]
mod tree_engine_test;
