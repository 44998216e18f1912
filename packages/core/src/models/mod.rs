//! Data Models
//!
//! This module contains the data structures used throughout the crate:
//!
//! - `TreeNode` - Persisted hierarchy record
//! - `Position` / `PositionRow` - The engine-owned position fields
//! - `PositionedNode` - Capability trait the engine operates on
//! - `NestedNode` - Nested in-memory tree views (assembly in `tree_view`)

mod node;
mod tree_view;

pub use node::{NewTreeNode, Position, PositionRow, PositionedNode, TreeNode};
pub use tree_view::{build_nested_tree, flatten_tree, sort_flat, NestedChildren, NestedNode};
