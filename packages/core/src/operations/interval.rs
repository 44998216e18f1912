//! Interval Arithmetic Core
//!
//! Pure computations for the three structural changes of a nested-set tree.
//! Each plan captures the new bounds of the node being changed and the
//! numeric ranges whose rows have to shift. The position repository turns a
//! plan into range-qualified `UPDATE`s; `apply` performs the same rewrite on
//! an in-memory slice so the arithmetic can be checked without storage.
//!
//! # Attach
//!
//! A new node under parent `P` (current `rgt(P) = R`) takes `[R, R+1]`. Every
//! row with `rgt >= R` grows by 2 and every row with `lft > R` moves by 2,
//! which opens a width-2 slot after `P`'s last child.
//!
//! # Relocate
//!
//! A subtree `N` of width `W` moves under `P'` and becomes its last child.
//!
//! - moving right (`rgt(P') > rgt(N)`): bounds in `[rgt(N)+1, rgt(P'))` shift
//!   by `-W`, the subtree shifts by `rgt(P') - 1 - rgt(N)`
//! - moving left (`rgt(P') < rgt(N)`): bounds in `[rgt(P'), lft(N))` shift by
//!   `+W`, the subtree shifts by `rgt(P') - lft(N)`
//!
//! The subtree itself never falls inside the shifted range; it is identified
//! by its pre-move interval `lft >= lft(N) AND rgt <= rgt(N)`.
//!
//! # Detach
//!
//! Deleting `N` promotes its children one level: they are re-pointed to `N`'s
//! parent, every descendant moves by `-1` (bounds and depth), and every bound
//! after `rgt(N)` moves by `-2`.

use crate::models::{Position, PositionRow};
use crate::operations::TreeOperationError;
use serde::{Deserialize, Serialize};

/// Direction of a relocation in `rgt` order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveDirection {
    Left,
    Right,
}

/// Half-open bound range `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundRange {
    pub start: i64,
    pub end: i64,
}

impl BoundRange {
    pub fn contains(&self, value: i64) -> bool {
        self.start <= value && value < self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Insertion of a new leaf as the last child of a parent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachPlan {
    pub node_id: i64,
    /// `rgt` of the parent before the gap is opened
    pub gap_at: i64,
    /// Final position of the attached node
    pub position: Position,
}

impl AttachPlan {
    pub fn compute(node_id: i64, parent_id: i64, parent: &Position) -> Self {
        let gap_at = parent.rgt;
        Self {
            node_id,
            gap_at,
            position: Position::new(parent_id, gap_at, gap_at + 1, parent.depth + 1),
        }
    }

    /// Shift in-memory rows and append the attached node
    pub fn apply(&self, rows: &mut Vec<PositionRow>) {
        for row in rows.iter_mut() {
            if row.rgt >= self.gap_at {
                row.rgt += 2;
            }
            if row.lft > self.gap_at {
                row.lft += 2;
            }
        }
        rows.push(PositionRow::new(self.node_id, self.position));
    }
}

/// Re-parenting of a whole subtree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelocatePlan {
    pub node_id: i64,
    pub new_parent_id: i64,
    /// Pre-move interval of the moving subtree
    pub subtree_lft: i64,
    pub subtree_rgt: i64,
    pub width: i64,
    pub direction: MoveDirection,
    /// Bounds of surrounding rows that shift
    pub range: BoundRange,
    /// Signed delta applied to bounds inside `range`
    pub shift: i64,
    /// Signed delta applied to the subtree's bounds
    pub distance: i64,
    pub depth_change: i64,
}

impl RelocatePlan {
    /// Compute the relocation of `node` under `new_parent`
    ///
    /// # Errors
    ///
    /// Returns `InvariantViolation` when `new_parent` is the node itself or
    /// lies inside the node's subtree.
    pub fn compute(
        node_id: i64,
        node: &Position,
        new_parent_id: i64,
        new_parent: &Position,
    ) -> Result<Self, TreeOperationError> {
        if new_parent_id == node_id
            || node.encloses(new_parent)
            || (new_parent.lft == node.lft && new_parent.rgt == node.rgt)
        {
            return Err(TreeOperationError::circular_parent(node_id, new_parent_id));
        }

        let width = node.width();
        let depth_change = new_parent.depth + 1 - node.depth;

        let (direction, range, shift, distance) = if new_parent.rgt > node.rgt {
            (
                MoveDirection::Right,
                BoundRange {
                    start: node.rgt + 1,
                    end: new_parent.rgt,
                },
                -width,
                new_parent.rgt - 1 - node.rgt,
            )
        } else {
            (
                MoveDirection::Left,
                BoundRange {
                    start: new_parent.rgt,
                    end: node.lft,
                },
                width,
                new_parent.rgt - node.lft,
            )
        };

        Ok(Self {
            node_id,
            new_parent_id,
            subtree_lft: node.lft,
            subtree_rgt: node.rgt,
            width,
            direction,
            range,
            shift,
            distance,
            depth_change,
        })
    }

    /// Row belongs to the moving subtree (pre-move bounds)
    pub fn in_subtree(&self, lft: i64, rgt: i64) -> bool {
        lft >= self.subtree_lft && rgt <= self.subtree_rgt
    }

    /// Position of the moved node after the relocation
    pub fn new_position(&self, depth: i64) -> Position {
        Position::new(
            self.new_parent_id,
            self.subtree_lft + self.distance,
            self.subtree_rgt + self.distance,
            depth + self.depth_change,
        )
    }

    /// Whether the relocation leaves every bound where it is
    pub fn is_noop(&self) -> bool {
        self.distance == 0 && self.depth_change == 0
    }

    pub fn apply(&self, rows: &mut [PositionRow]) {
        for row in rows.iter_mut() {
            if self.in_subtree(row.lft, row.rgt) {
                row.lft += self.distance;
                row.rgt += self.distance;
                row.depth += self.depth_change;
                if row.id == self.node_id {
                    row.parent_id = self.new_parent_id;
                }
                continue;
            }
            if self.range.contains(row.lft) {
                row.lft += self.shift;
            }
            if self.range.contains(row.rgt) {
                row.rgt += self.shift;
            }
        }
    }
}

/// Removal of one node with promotion of its children
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetachPlan {
    pub node_id: i64,
    /// Parent that inherits the node's children
    pub parent_id: i64,
    pub lft: i64,
    pub rgt: i64,
}

impl DetachPlan {
    pub fn compute(node_id: i64, node: &Position) -> Self {
        Self {
            node_id,
            parent_id: node.parent_id,
            lft: node.lft,
            rgt: node.rgt,
        }
    }

    pub fn is_descendant(&self, lft: i64, rgt: i64) -> bool {
        lft > self.lft && rgt < self.rgt
    }

    /// Rewrite in-memory rows and drop the detached node
    pub fn apply(&self, rows: &mut Vec<PositionRow>) {
        rows.retain(|row| row.id != self.node_id);
        for row in rows.iter_mut() {
            if row.parent_id == self.node_id {
                row.parent_id = self.parent_id;
            }
            if self.is_descendant(row.lft, row.rgt) {
                row.lft -= 1;
                row.rgt -= 1;
                row.depth -= 1;
                continue;
            }
            if row.rgt > self.rgt {
                row.rgt -= 2;
            }
            if row.lft > self.rgt {
                row.lft -= 2;
            }
        }
    }
}

/// Check nested-set invariants over a complete in-memory row set
///
/// Returns the first violation found. Used by tests and by the rebuild
/// report; not on any mutation path.
pub fn check_invariants(rows: &[PositionRow], root_id: i64) -> Result<(), String> {
    use std::collections::HashMap;

    let by_id: HashMap<i64, &PositionRow> = rows.iter().map(|r| (r.id, r)).collect();
    let root = by_id
        .get(&root_id)
        .ok_or_else(|| format!("root {} missing", root_id))?;
    if root.depth != 0 || root.lft != 1 {
        return Err(format!("root at ({}, {}) depth {}", root.lft, root.rgt, root.depth));
    }
    if root.rgt != 2 * rows.len() as i64 {
        return Err(format!(
            "root rgt {} does not cover {} rows",
            root.rgt,
            rows.len()
        ));
    }

    for row in rows {
        if row.lft >= row.rgt {
            return Err(format!("node {} has lft {} >= rgt {}", row.id, row.lft, row.rgt));
        }
        if row.id == root_id {
            continue;
        }
        let parent = by_id
            .get(&row.parent_id)
            .ok_or_else(|| format!("node {} has missing parent {}", row.id, row.parent_id))?;
        if !parent.position().encloses(&row.position()) {
            return Err(format!("node {} is not inside parent {}", row.id, parent.id));
        }
        if row.depth != parent.depth + 1 {
            return Err(format!("node {} has depth {} under parent depth {}", row.id, row.depth, parent.depth));
        }
    }

    for (i, a) in rows.iter().enumerate() {
        for b in &rows[i + 1..] {
            let (pa, pb) = (a.position(), b.position());
            if !(pa.encloses(&pb) || pb.encloses(&pa) || pa.is_disjoint(&pb)) {
                return Err(format!("nodes {} and {} overlap", a.id, b.id));
            }
        }
    }

    Ok(())
}
