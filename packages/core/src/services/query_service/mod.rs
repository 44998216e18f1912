//! Query Service - Interval Lookups and Tree Views
//!
//! Read-only queries over one hierarchy, expressed as interval predicates on
//! the position columns and executed through a [`NodeStore`]. The synthetic
//! root is hidden from every result except [`TreeQueryService::root_node`]
//! and [`TreeQueryService::tree_with_root`]; soft-deleted rows are hidden
//! from every result.
//!
//! # Query Patterns
//!
//! - Ancestors: `lft < node.lft AND rgt > node.rgt ORDER BY lft DESC`
//! - Descendants: `lft > node.lft AND rgt < node.rgt ORDER BY lft`
//! - Leaves: `lft = rgt - 1`
//! - Flat tree: every row `ORDER BY lft`
//!
//! # Examples
//!
//! ```rust,no_run
//! use nestedset_core::config::TreeConfig;
//! use nestedset_core::db::{DatabaseService, TursoStore};
//! use nestedset_core::services::TreeQueryService;
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = TreeConfig::default();
//! let db = Arc::new(DatabaseService::new(PathBuf::from("./data/tree.db"), config.clone()).await?);
//! let queries = TreeQueryService::new(Arc::new(TursoStore::new(db)), &config);
//!
//! for ancestor in queries.ancestors(16).await? {
//!     println!("{} at depth {:?}", ancestor.name, ancestor.depth);
//! }
//! # Ok(())
//! # }
//! ```

use crate::config::TreeConfig;
use crate::db::{NodeOrder, NodeQuery, NodeStore, RangeFilter};
use crate::models::{build_nested_tree, NestedNode, Position, PositionedNode, TreeNode};
use crate::operations::TreeOperationError;
use std::sync::Arc;

/// Read-only queries over one configured hierarchy
#[derive(Clone)]
pub struct TreeQueryService {
    store: Arc<dyn NodeStore>,
    root_id: i64,
}

impl TreeQueryService {
    pub fn new(store: Arc<dyn NodeStore>, config: &TreeConfig) -> Self {
        Self {
            store,
            root_id: config.root_id,
        }
    }

    /// Live, positioned reference node (the root is allowed here)
    async fn reference(&self, id: i64) -> Result<Position, TreeOperationError> {
        let node = self
            .store
            .get_node(id)
            .await?
            .filter(|n| !n.is_trashed())
            .ok_or_else(|| TreeOperationError::node_not_found(id))?;
        node.position()
            .ok_or_else(|| TreeOperationError::unpositioned(id))
    }

    async fn scoped(&self, query: NodeQuery) -> Result<Vec<TreeNode>, TreeOperationError> {
        let query = NodeQuery {
            exclude_root: true,
            ..query
        };
        Ok(self.store.query_nodes(&query).await?)
    }

    /// The synthetic root row, bypassing root scoping
    pub async fn root_node(&self) -> Result<TreeNode, TreeOperationError> {
        self.store
            .get_node(self.root_id)
            .await?
            .ok_or_else(|| TreeOperationError::node_not_found(self.root_id))
    }

    /// Live node by id (`None` for the root, trashed or unknown rows)
    pub async fn get_node(&self, id: i64) -> Result<Option<TreeNode>, TreeOperationError> {
        if id == self.root_id {
            return Ok(None);
        }
        Ok(self.store.get_node(id).await?.filter(|n| !n.is_trashed()))
    }

    /// Parent record (`None` for top-level nodes, whose parent is the root)
    pub async fn parent(&self, id: i64) -> Result<Option<TreeNode>, TreeOperationError> {
        let node = self
            .get_node(id)
            .await?
            .ok_or_else(|| TreeOperationError::node_not_found(id))?;
        match node.parent_id {
            Some(parent_id) => self.get_node(parent_id).await,
            None => Ok(None),
        }
    }

    /// Direct children in sibling order
    pub async fn children(&self, id: i64) -> Result<Vec<TreeNode>, TreeOperationError> {
        self.scoped(NodeQuery::default().children_of(id)).await
    }

    /// Every ancestor, nearest first
    pub async fn ancestors(&self, id: i64) -> Result<Vec<TreeNode>, TreeOperationError> {
        let position = self.reference(id).await?;
        self.scoped(
            NodeQuery::default()
                .in_range(RangeFilter::ancestors_of(&position))
                .ordered(NodeOrder::LftDescending),
        )
        .await
    }

    /// Every descendant in `lft` order
    pub async fn descendants(&self, id: i64) -> Result<Vec<TreeNode>, TreeOperationError> {
        let position = self.reference(id).await?;
        self.scoped(NodeQuery::default().in_range(RangeFilter::descendants_of(&position)))
            .await
    }

    /// Whether `ancestor_id` is a (visible) ancestor of `id`
    pub async fn has_ancestor(&self, id: i64, ancestor_id: i64) -> Result<bool, TreeOperationError> {
        Ok(self
            .ancestors(id)
            .await?
            .iter()
            .any(|n| n.id == ancestor_id))
    }

    /// Whether `descendant_id` is a descendant of `id`
    pub async fn has_descendant(
        &self,
        id: i64,
        descendant_id: i64,
    ) -> Result<bool, TreeOperationError> {
        Ok(self
            .descendants(id)
            .await?
            .iter()
            .any(|n| n.id == descendant_id))
    }

    /// Every node without children
    pub async fn leaf_nodes(&self) -> Result<Vec<TreeNode>, TreeOperationError> {
        self.scoped(NodeQuery::default().leaves_only()).await
    }

    /// `rgt - lft + 1` of one node
    pub async fn width(&self, id: i64) -> Result<i64, TreeOperationError> {
        Ok(self.reference(id).await?.width())
    }

    /// All visible nodes in `lft` order
    pub async fn flat_tree(&self) -> Result<Vec<TreeNode>, TreeOperationError> {
        self.scoped(NodeQuery::default()).await
    }

    /// Nested view of the whole hierarchy; top level is the root's children
    pub async fn tree(&self) -> Result<Vec<NestedNode<TreeNode>>, TreeOperationError> {
        Ok(build_nested_tree(self.flat_tree().await?))
    }

    /// Nested view with the synthetic root as the single top node
    pub async fn tree_with_root(&self) -> Result<Vec<NestedNode<TreeNode>>, TreeOperationError> {
        let nodes = self.store.query_nodes(&NodeQuery::all()).await?;
        Ok(build_nested_tree(nodes))
    }

    /// Ancestors as a single nested chain, outermost first
    pub async fn ancestors_tree(
        &self,
        id: i64,
    ) -> Result<Vec<NestedNode<TreeNode>>, TreeOperationError> {
        let mut ancestors = self.ancestors(id).await?;
        ancestors.reverse();
        Ok(build_nested_tree(ancestors))
    }

    /// Descendants nested under their parents; top level is the node's children
    pub async fn descendants_tree(
        &self,
        id: i64,
    ) -> Result<Vec<NestedNode<TreeNode>>, TreeOperationError> {
        Ok(build_nested_tree(self.descendants(id).await?))
    }
}
