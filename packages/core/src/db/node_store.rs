//! NodeStore Trait - Record Persistence Boundary
//!
//! This module defines the `NodeStore` trait: everything the lifecycle and
//! query services need from the record layer. Position columns are read here
//! but never written; structural writes go through the position repository.
//!
//! # Design Decisions
//!
//! 1. **Async-First**: All methods are async so a networked backend can sit
//!    behind the same trait as the embedded libsql store
//! 2. **Typed Errors**: Methods return `DatabaseError`; row conversion uses
//!    `anyhow` context internally and is folded into `RowConversion`
//! 3. **Declarative Queries**: Range lookups are described by [`NodeQuery`]
//!    instead of raw SQL, so the query service stays storage-agnostic
//!
//! # Examples
//!
//! ```rust,no_run
//! use nestedset_core::config::TreeConfig;
//! use nestedset_core::db::{DatabaseService, NodeQuery, NodeStore, TursoStore};
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let db = Arc::new(DatabaseService::new(PathBuf::from("./data/tree.db"), TreeConfig::default()).await?);
//!     let store: Arc<dyn NodeStore> = Arc::new(TursoStore::new(db));
//!
//!     let leaves = store.query_nodes(&NodeQuery::scoped().leaves_only()).await?;
//!     println!("{} leaves", leaves.len());
//!     Ok(())
//! }
//! ```

use crate::db::DatabaseError;
use crate::models::{Position, TreeNode};
use async_trait::async_trait;
use serde_json::Value;

/// Interval predicate relative to one node's bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeFilter {
    /// `lft < node.lft AND rgt > node.rgt`
    AncestorsOf { lft: i64, rgt: i64 },
    /// `lft > node.lft AND rgt < node.rgt`
    DescendantsOf { lft: i64, rgt: i64 },
}

impl RangeFilter {
    pub fn ancestors_of(position: &Position) -> Self {
        Self::AncestorsOf {
            lft: position.lft,
            rgt: position.rgt,
        }
    }

    pub fn descendants_of(position: &Position) -> Self {
        Self::DescendantsOf {
            lft: position.lft,
            rgt: position.rgt,
        }
    }
}

/// Result ordering by `lft`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeOrder {
    #[default]
    LftAscending,
    /// Nearest ancestor first when combined with `AncestorsOf`
    LftDescending,
}

/// Declarative row filter
///
/// The default query selects every live row, root included, in `lft` order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeQuery {
    pub range: Option<RangeFilter>,
    pub parent_id: Option<i64>,
    pub leaves_only: bool,
    pub exclude_root: bool,
    pub include_trashed: bool,
    pub order: NodeOrder,
}

impl NodeQuery {
    /// Every live row, root included
    pub fn all() -> Self {
        Self::default()
    }

    /// Every live row except the synthetic root
    pub fn scoped() -> Self {
        Self {
            exclude_root: true,
            ..Default::default()
        }
    }

    pub fn in_range(mut self, range: RangeFilter) -> Self {
        self.range = Some(range);
        self
    }

    pub fn children_of(mut self, parent_id: i64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn leaves_only(mut self) -> Self {
        self.leaves_only = true;
        self
    }

    pub fn with_trashed(mut self) -> Self {
        self.include_trashed = true;
        self
    }

    pub fn ordered(mut self, order: NodeOrder) -> Self {
        self.order = order;
        self
    }
}

/// Abstraction layer for hierarchy record persistence
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` so services can share them across
/// tasks.
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Insert a record with unset bounds under an already resolved parent
    ///
    /// # Returns
    ///
    /// The stored record, including the generated id and timestamps.
    async fn create_node(
        &self,
        name: &str,
        parent_id: i64,
        properties: &Value,
    ) -> Result<TreeNode, DatabaseError>;

    /// Fetch one record by id, trashed records included
    async fn get_node(&self, id: i64) -> Result<Option<TreeNode>, DatabaseError>;

    /// Replace the caller payload (`name`, `properties`) of a record
    ///
    /// # Returns
    ///
    /// The updated record, or `None` when the id does not exist.
    async fn update_node(
        &self,
        id: i64,
        name: &str,
        properties: &Value,
    ) -> Result<Option<TreeNode>, DatabaseError>;

    /// Set `deleted_at`; returns whether a live row was trashed
    async fn soft_delete_node(&self, id: i64) -> Result<bool, DatabaseError>;

    /// Clear `deleted_at`; returns whether a trashed row was restored
    async fn restore_node(&self, id: i64) -> Result<bool, DatabaseError>;

    /// Remove the row; returns whether it existed
    async fn delete_node(&self, id: i64) -> Result<bool, DatabaseError>;

    /// Select records matching a declarative filter
    async fn query_nodes(&self, query: &NodeQuery) -> Result<Vec<TreeNode>, DatabaseError>;
}
