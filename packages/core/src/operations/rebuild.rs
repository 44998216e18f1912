//! Tree Rebuild
//!
//! Recomputes every position from `parent_id` alone. This is the repair path
//! for tables whose bounds are missing or corrupted: rows only need a correct
//! parent link, and sibling order follows the input order (ascending `lft`,
//! unpositioned rows last, then id).
//!
//! The walk is iterative so that arbitrarily deep chains do not exhaust the
//! call stack.

use crate::models::{Position, PositionRow, PositionedNode};
use crate::operations::TreeOperationError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Result of a rebuild computation
#[derive(Debug, Clone, PartialEq)]
pub struct RebuildPlan {
    /// Every row reachable from the root, in ascending `lft` order
    pub positions: Vec<PositionRow>,
    /// Rows whose stored position differs from the recomputed one
    pub changed: Vec<PositionRow>,
    /// Rows not reachable from the root; their positions are left untouched
    pub orphans: Vec<i64>,
}

impl RebuildPlan {
    pub fn report(&self) -> RebuildReport {
        RebuildReport {
            positioned: self.positions.len(),
            updated: self.changed.len(),
            orphans: self.orphans.clone(),
        }
    }
}

/// Summary returned by a persisted rebuild
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildReport {
    pub positioned: usize,
    pub updated: usize,
    pub orphans: Vec<i64>,
}

impl RebuildReport {
    pub fn is_clean(&self) -> bool {
        self.orphans.is_empty()
    }
}

/// Recompute positions for every row reachable from `root_id`
///
/// # Arguments
///
/// * `nodes` - Rows of the hierarchy, root included, in the desired sibling order
/// * `root_id` - Id of the synthetic root
/// * `root_parent_id` - Sentinel stored as the root's parent
///
/// # Errors
///
/// Returns `MissingNode` if the root is not among `nodes`.
///
/// # Examples
///
/// ```rust
/// use nestedset_core::models::TreeNode;
/// use nestedset_core::operations::compute_positions;
/// use serde_json::json;
///
/// let rows = vec![
///     TreeNode::new(1, "root", Some(0), json!({})),
///     TreeNode::new(2, "a", Some(1), json!({})),
///     TreeNode::new(3, "b", Some(2), json!({})),
/// ];
/// let plan = compute_positions(rows, 1, 0).unwrap();
/// assert_eq!((plan.positions[0].lft, plan.positions[0].rgt), (1, 6));
/// assert_eq!((plan.positions[2].lft, plan.positions[2].rgt), (3, 4));
/// ```
pub fn compute_positions<N: PositionedNode>(
    nodes: Vec<N>,
    root_id: i64,
    root_parent_id: i64,
) -> Result<RebuildPlan, TreeOperationError> {
    let mut current: HashMap<i64, Option<Position>> = HashMap::with_capacity(nodes.len());
    let mut children: HashMap<i64, Vec<i64>> = HashMap::new();
    let mut order: Vec<i64> = Vec::with_capacity(nodes.len());

    for node in &nodes {
        let id = node.node_id();
        current.insert(id, node.position());
        order.push(id);
        if id == root_id {
            continue;
        }
        if let Some(parent_id) = node.parent_id() {
            children.entry(parent_id).or_default().push(id);
        }
    }

    if !current.contains_key(&root_id) {
        return Err(TreeOperationError::node_not_found(root_id));
    }

    let mut positions = Vec::with_capacity(nodes.len());
    let mut visited: HashSet<i64> = HashSet::with_capacity(nodes.len());
    let mut counter = 1;

    // (id, parent id, lft, depth, next child index)
    let mut stack: Vec<(i64, i64, i64, i64, usize)> = vec![(root_id, root_parent_id, counter, 0, 0)];
    visited.insert(root_id);
    counter += 1;

    while let Some(frame) = stack.last_mut() {
        let (id, parent_id, lft, depth, next) = *frame;
        let child = children
            .get(&id)
            .and_then(|c| c.get(next).copied());

        match child {
            Some(child_id) => {
                frame.4 += 1;
                if visited.insert(child_id) {
                    stack.push((child_id, id, counter, depth + 1, 0));
                    counter += 1;
                }
            }
            None => {
                stack.pop();
                positions.push(PositionRow::new(
                    id,
                    Position::new(parent_id, lft, counter, depth),
                ));
                counter += 1;
            }
        }
    }

    positions.sort_by_key(|row| row.lft);

    let changed = positions
        .iter()
        .filter(|row| current.get(&row.id).copied().flatten() != Some(row.position()))
        .copied()
        .collect();

    let orphans = order.into_iter().filter(|id| !visited.contains(id)).collect();

    Ok(RebuildPlan {
        positions,
        changed,
        orphans,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TreeNode;
    use crate::operations::interval::check_invariants;
    use serde_json::json;

    fn unpositioned(id: i64, parent_id: i64) -> TreeNode {
        TreeNode::new(id, format!("category {}", id), Some(parent_id), json!({}))
    }

    fn bounds(plan: &RebuildPlan, id: i64) -> (i64, i64, i64) {
        let row = plan.positions.iter().find(|r| r.id == id).unwrap();
        (row.lft, row.rgt, row.depth)
    }

    /// Insertion order used throughout the scenario tests
    fn category_rows() -> Vec<TreeNode> {
        let parents = [
            (1, 0),
            (2, 1),
            (3, 1),
            (4, 1),
            (5, 1),
            (6, 1),
            (7, 3),
            (8, 3),
            (9, 3),
            (10, 3),
            (11, 5),
            (12, 5),
            (13, 6),
            (14, 2),
            (15, 2),
            (16, 10),
            (17, 10),
            (18, 10),
        ];
        parents.iter().map(|&(id, parent)| unpositioned(id, parent)).collect()
    }

    #[test]
    fn test_rebuild_from_parent_links() {
        let plan = compute_positions(category_rows(), 1, 0).unwrap();

        assert!(plan.orphans.is_empty());
        assert_eq!(plan.changed.len(), 18);
        assert_eq!(bounds(&plan, 1), (1, 36, 0));
        assert_eq!(bounds(&plan, 2), (2, 7, 1));
        assert_eq!(bounds(&plan, 14), (3, 4, 2));
        assert_eq!(bounds(&plan, 15), (5, 6, 2));
        assert_eq!(bounds(&plan, 3), (8, 23, 1));
        assert_eq!(bounds(&plan, 10), (15, 22, 2));
        assert_eq!(bounds(&plan, 18), (20, 21, 3));
        assert_eq!(bounds(&plan, 5), (26, 31, 1));
        assert_eq!(bounds(&plan, 6), (32, 35, 1));
        assert_eq!(bounds(&plan, 13), (33, 34, 2));

        check_invariants(&plan.positions, 1).unwrap();
    }

    #[test]
    fn test_rebuild_of_valid_tree_changes_nothing() {
        let first = compute_positions(category_rows(), 1, 0).unwrap();
        let second = compute_positions(first.positions.clone(), 1, 0).unwrap();
        assert_eq!(second.positions, first.positions);
        assert!(second.changed.is_empty());
    }

    #[test]
    fn test_orphans_are_reported_not_positioned() {
        let mut rows = category_rows();
        rows.push(unpositioned(40, 99));
        rows.push(unpositioned(41, 40));

        let plan = compute_positions(rows, 1, 0).unwrap();
        assert_eq!(plan.orphans, vec![40, 41]);
        assert!(plan.positions.iter().all(|r| r.id != 40 && r.id != 41));
        assert!(!plan.report().is_clean());
    }

    #[test]
    fn test_parent_cycle_is_orphaned() {
        let rows = vec![unpositioned(1, 0), unpositioned(2, 3), unpositioned(3, 2)];
        let plan = compute_positions(rows, 1, 0).unwrap();
        assert_eq!(plan.orphans, vec![2, 3]);
        assert_eq!(bounds(&plan, 1), (1, 2, 0));
    }

    #[test]
    fn test_missing_root() {
        let err = compute_positions(vec![unpositioned(2, 1)], 1, 0).unwrap_err();
        assert!(err.is_missing_node());
    }

    #[test]
    fn test_deep_chain() {
        let mut rows = vec![unpositioned(1, 0)];
        for id in 2..=5000 {
            rows.push(unpositioned(id, id - 1));
        }
        let plan = compute_positions(rows, 1, 0).unwrap();
        assert_eq!(bounds(&plan, 1), (1, 10000, 0));
        assert_eq!(bounds(&plan, 5000), (5000, 5001, 4999));
    }
}
