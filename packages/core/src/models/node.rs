//! Tree Node Data Structures
//!
//! This module defines the persisted hierarchy record (`TreeNode`), the four
//! position fields the engine owns (`Position`), and the `PositionedNode`
//! capability trait the engine operates on generically.
//!
//! # Position Ownership
//!
//! `lft`, `rgt`, `depth` and `parent_id` are written only by the tree engine
//! and the rebuild walk. A freshly inserted record carries unset (NULL) bounds
//! until the engine attaches it.
//!
//! # Examples
//!
//! ```rust
//! use nestedset_core::models::{PositionedNode, TreeNode};
//! use serde_json::json;
//!
//! let node = TreeNode::new(7, "Shoes", Some(3), json!({"slug": "shoes"}));
//! assert_eq!(node.node_id(), 7);
//! assert!(node.position().is_none());
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The four position fields of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub parent_id: i64,
    pub lft: i64,
    pub rgt: i64,
    pub depth: i64,
}

impl Position {
    pub fn new(parent_id: i64, lft: i64, rgt: i64, depth: i64) -> Self {
        Self {
            parent_id,
            lft,
            rgt,
            depth,
        }
    }

    /// `rgt - lft + 1`, twice the number of nodes in the subtree
    pub fn width(&self) -> i64 {
        self.rgt - self.lft + 1
    }

    pub fn is_leaf(&self) -> bool {
        self.rgt == self.lft + 1
    }

    /// Strict containment: `other` lies inside this interval
    pub fn encloses(&self, other: &Position) -> bool {
        self.lft < other.lft && other.rgt < self.rgt
    }

    /// The intervals share no bound range at all
    pub fn is_disjoint(&self, other: &Position) -> bool {
        self.rgt < other.lft || other.rgt < self.lft
    }
}

/// A position tagged with its row id
///
/// This is the unit the interval core and the rebuild walk work with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionRow {
    pub id: i64,
    pub parent_id: i64,
    pub lft: i64,
    pub rgt: i64,
    pub depth: i64,
}

impl PositionRow {
    pub fn new(id: i64, position: Position) -> Self {
        Self {
            id,
            parent_id: position.parent_id,
            lft: position.lft,
            rgt: position.rgt,
            depth: position.depth,
        }
    }

    pub fn position(&self) -> Position {
        Position::new(self.parent_id, self.lft, self.rgt, self.depth)
    }
}

/// Capability interface for records that live in a nested-set hierarchy
///
/// Concrete record types implement the accessors; the engine reads the id and
/// parent, and writes refreshed positions back through [`apply_position`].
///
/// [`apply_position`]: PositionedNode::apply_position
pub trait PositionedNode {
    fn node_id(&self) -> i64;

    fn parent_id(&self) -> Option<i64>;

    fn set_parent_id(&mut self, parent_id: Option<i64>);

    fn lft(&self) -> Option<i64>;

    fn set_lft(&mut self, lft: Option<i64>);

    fn rgt(&self) -> Option<i64>;

    fn set_rgt(&mut self, rgt: Option<i64>);

    fn depth(&self) -> Option<i64>;

    fn set_depth(&mut self, depth: Option<i64>);

    /// Complete position, or `None` while any bound is unset
    fn position(&self) -> Option<Position> {
        Some(Position::new(
            self.parent_id()?,
            self.lft()?,
            self.rgt()?,
            self.depth()?,
        ))
    }

    /// Overwrite the four position fields with persisted values
    fn apply_position(&mut self, position: &Position) {
        self.set_parent_id(Some(position.parent_id));
        self.set_lft(Some(position.lft));
        self.set_rgt(Some(position.rgt));
        self.set_depth(Some(position.depth));
    }

    fn width(&self) -> Option<i64> {
        Some(self.rgt()? - self.lft()? + 1)
    }

    fn is_leaf(&self) -> bool {
        matches!((self.lft(), self.rgt()), (Some(l), Some(r)) if r == l + 1)
    }
}

/// One persisted row of a hierarchy table
///
/// # Fields
///
/// - `id`: Stable integer identifier
/// - `name`: Caller payload (display label)
/// - `parent_id`: Parent row id (root id when attached at top level)
/// - `lft` / `rgt` / `depth`: Nested-set position, `None` until attached
/// - `properties`: Arbitrary JSON payload owned by the caller
/// - `deleted_at`: Set when the row is soft-deleted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    pub id: i64,

    pub name: String,

    pub parent_id: Option<i64>,

    pub lft: Option<i64>,

    pub rgt: Option<i64>,

    pub depth: Option<i64>,

    #[serde(default)]
    pub properties: Value,

    pub created_at: DateTime<Utc>,

    pub modified_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl TreeNode {
    /// Build an unpositioned in-memory record
    pub fn new(id: i64, name: impl Into<String>, parent_id: Option<i64>, properties: Value) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            parent_id,
            lft: None,
            rgt: None,
            depth: None,
            properties,
            created_at: now,
            modified_at: now,
            deleted_at: None,
        }
    }

    pub fn is_trashed(&self) -> bool {
        self.deleted_at.is_some()
    }
}

impl PositionedNode for TreeNode {
    fn node_id(&self) -> i64 {
        self.id
    }

    fn parent_id(&self) -> Option<i64> {
        self.parent_id
    }

    fn set_parent_id(&mut self, parent_id: Option<i64>) {
        self.parent_id = parent_id;
    }

    fn lft(&self) -> Option<i64> {
        self.lft
    }

    fn set_lft(&mut self, lft: Option<i64>) {
        self.lft = lft;
    }

    fn rgt(&self) -> Option<i64> {
        self.rgt
    }

    fn set_rgt(&mut self, rgt: Option<i64>) {
        self.rgt = rgt;
    }

    fn depth(&self) -> Option<i64> {
        self.depth
    }

    fn set_depth(&mut self, depth: Option<i64>) {
        self.depth = depth;
    }
}

impl PositionedNode for PositionRow {
    fn node_id(&self) -> i64 {
        self.id
    }

    fn parent_id(&self) -> Option<i64> {
        Some(self.parent_id)
    }

    fn set_parent_id(&mut self, parent_id: Option<i64>) {
        if let Some(parent_id) = parent_id {
            self.parent_id = parent_id;
        }
    }

    fn lft(&self) -> Option<i64> {
        Some(self.lft)
    }

    fn set_lft(&mut self, lft: Option<i64>) {
        if let Some(lft) = lft {
            self.lft = lft;
        }
    }

    fn rgt(&self) -> Option<i64> {
        Some(self.rgt)
    }

    fn set_rgt(&mut self, rgt: Option<i64>) {
        if let Some(rgt) = rgt {
            self.rgt = rgt;
        }
    }

    fn depth(&self) -> Option<i64> {
        Some(self.depth)
    }

    fn set_depth(&mut self, depth: Option<i64>) {
        if let Some(depth) = depth {
            self.depth = depth;
        }
    }
}

/// Parameters for inserting a new hierarchy record
///
/// A missing `parent_id` is replaced by the configured root id before the
/// row is written.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTreeNode {
    pub name: String,
    pub parent_id: Option<i64>,
    #[serde(default)]
    pub properties: Value,
}

impl NewTreeNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent_id: None,
            properties: Value::Object(Default::default()),
        }
    }

    pub fn under(mut self, parent_id: i64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_properties(mut self, properties: Value) -> Self {
        self.properties = properties;
        self
    }
}
