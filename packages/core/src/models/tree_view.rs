//! Tree Assembly
//!
//! Builds nested and flat in-memory views from a flat, `lft`-ordered row set.
//! Views own no storage and are rebuilt for every read.
//!
//! # Grouping Rule
//!
//! Rows are grouped by `parent_id`. The top of the view is every group whose
//! parent id does not occur among the rows' own ids: a parent that was
//! filtered out, or the hidden root when it is excluded. Top groups keep the
//! order in which their parent ids first appear, and children keep input
//! order, so an `lft`-ordered input yields `lft`-ordered siblings.

use crate::models::PositionedNode;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::ops::{Deref, DerefMut};

/// One node of a nested view with its assembled children
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NestedNode<N> {
    #[serde(flatten)]
    pub node: N,
    pub children: NestedChildren<N>,
}

impl<N> NestedNode<N> {
    pub fn leaf(node: N) -> Self {
        Self {
            node,
            children: NestedChildren::default(),
        }
    }

    /// Number of nodes in this subtree, including this one
    pub fn size(&self) -> usize {
        let mut size = 0;
        let mut stack = vec![self];
        while let Some(nested) = stack.pop() {
            size += 1;
            stack.extend(nested.children.iter());
        }
        size
    }

    /// Longest path below this node (0 for a leaf)
    pub fn height(&self) -> usize {
        let mut height = 0;
        let mut stack = vec![(self, 0)];
        while let Some((nested, level)) = stack.pop() {
            height = height.max(level);
            stack.extend(nested.children.iter().map(|c| (c, level + 1)));
        }
        height
    }
}

/// Child list of a [`NestedNode`]
///
/// Derefs to `Vec<NestedNode<N>>`. Dropping it tears the subtree down
/// level by level, so deep chains never recurse.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct NestedChildren<N>(Vec<NestedNode<N>>);

impl<N> NestedChildren<N> {
    pub fn into_vec(mut self) -> Vec<NestedNode<N>> {
        std::mem::take(&mut self.0)
    }
}

impl<N> Default for NestedChildren<N> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<N> From<Vec<NestedNode<N>>> for NestedChildren<N> {
    fn from(children: Vec<NestedNode<N>>) -> Self {
        Self(children)
    }
}

impl<N> Deref for NestedChildren<N> {
    type Target = Vec<NestedNode<N>>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<N> DerefMut for NestedChildren<N> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<N> Drop for NestedChildren<N> {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.0);
        while let Some(mut nested) = pending.pop() {
            pending.append(&mut nested.children.0);
        }
    }
}

/// Assemble a nested view from flat rows
///
/// # Examples
///
/// ```rust
/// use nestedset_core::models::{build_nested_tree, Position, PositionRow};
///
/// let rows = vec![
///     PositionRow::new(2, Position::new(1, 2, 5, 1)),
///     PositionRow::new(3, Position::new(2, 3, 4, 2)),
///     PositionRow::new(4, Position::new(1, 6, 7, 1)),
/// ];
/// let tree = build_nested_tree(rows);
/// assert_eq!(tree.len(), 2);
/// assert_eq!(tree[0].children[0].node.id, 3);
/// ```
pub fn build_nested_tree<N: PositionedNode>(nodes: Vec<N>) -> Vec<NestedNode<N>> {
    let ids: HashSet<i64> = nodes.iter().map(PositionedNode::node_id).collect();

    let mut top_parent_ids: Vec<Option<i64>> = Vec::new();
    let mut seen_top: HashSet<Option<i64>> = HashSet::new();
    let mut groups: HashMap<Option<i64>, Vec<N>> = HashMap::new();

    for node in nodes {
        let parent_id = node.parent_id();
        let is_top = parent_id.map_or(true, |p| !ids.contains(&p));
        if is_top && seen_top.insert(parent_id) {
            top_parent_ids.push(parent_id);
        }
        groups.entry(parent_id).or_default().push(node);
    }

    let mut tree = Vec::new();
    for parent_id in top_parent_ids {
        if let Some(group) = groups.remove(&parent_id) {
            for node in group {
                tree.push(assemble(node, &mut groups));
            }
        }
    }
    tree
}

/// A node whose children are being assembled
struct Frame<N> {
    node: N,
    pending: std::vec::IntoIter<N>,
    children: Vec<NestedNode<N>>,
}

impl<N: PositionedNode> Frame<N> {
    fn open(node: N, groups: &mut HashMap<Option<i64>, Vec<N>>) -> Self {
        let pending = groups
            .remove(&Some(node.node_id()))
            .unwrap_or_default()
            .into_iter();
        Self {
            node,
            pending,
            children: Vec::new(),
        }
    }
}

/// Depth-first assembly of one top node, driven by an explicit stack
fn assemble<N: PositionedNode>(
    top: N,
    groups: &mut HashMap<Option<i64>, Vec<N>>,
) -> NestedNode<N> {
    let mut stack = vec![Frame::open(top, groups)];
    loop {
        let next_child = match stack.last_mut() {
            Some(frame) => frame.pending.next(),
            None => None,
        };
        if let Some(child) = next_child {
            stack.push(Frame::open(child, groups));
            continue;
        }

        if let Some(Frame { node, children, .. }) = stack.pop() {
            let nested = NestedNode {
                node,
                children: children.into(),
            };
            match stack.last_mut() {
                Some(parent) => parent.children.push(nested),
                None => return nested,
            }
        }
    }
}

/// Pre-order flattening of a nested view
pub fn flatten_tree<N>(tree: Vec<NestedNode<N>>) -> Vec<N> {
    let mut flat = Vec::new();
    let mut stack: Vec<NestedNode<N>> = tree.into_iter().rev().collect();
    while let Some(NestedNode { node, children }) = stack.pop() {
        flat.push(node);
        stack.extend(children.into_vec().into_iter().rev());
    }
    flat
}

/// Flat view: nodes ordered by ascending `lft`, unpositioned nodes last
pub fn sort_flat<N: PositionedNode>(mut nodes: Vec<N>) -> Vec<N> {
    nodes.sort_by_key(|n| (n.lft().is_none(), n.lft(), n.node_id()));
    nodes
}
