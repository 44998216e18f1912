//! Tree Property Tests
//!
//! Random attach/relocate/detach sequences must keep every nested-set
//! invariant. The interval plans are checked against in-memory rows with many
//! cases; the libsql-backed engine runs fewer cases and must end up with
//! exactly the bounds the in-memory model predicts, for both relocate
//! strategies.

use nestedset_core::config::{RelocateStrategy, TreeConfig};
use nestedset_core::db::{DatabaseService, NodeQuery, NodeStore, Removal, TursoStore};
use nestedset_core::models::{Position, PositionRow, PositionedNode};
use nestedset_core::operations::{
    check_invariants, compute_positions, AttachPlan, DetachPlan, RelocatePlan,
};
use nestedset_core::services::TreeMutationEngine;
use proptest::prelude::*;
use std::sync::Arc;
use tempfile::TempDir;

const ROOT_ID: i64 = 1;

/// Tree operation for property testing; indexes pick from the current rows
#[derive(Debug, Clone)]
enum TreeOp {
    Attach { parent: usize },
    Relocate { node: usize, parent: usize },
    Detach { node: usize },
}

fn arb_tree_op() -> impl Strategy<Value = TreeOp> {
    prop_oneof![
        3 => (0usize..64).prop_map(|parent| TreeOp::Attach { parent }),
        2 => (0usize..64, 0usize..64).prop_map(|(node, parent)| TreeOp::Relocate { node, parent }),
        1 => (0usize..64).prop_map(|node| TreeOp::Detach { node }),
    ]
}

/// In-memory hierarchy driven by the same plans the engine uses
struct Model {
    rows: Vec<PositionRow>,
    next_id: i64,
}

/// What the engine is expected to do for one op
#[derive(Debug, Clone, Copy)]
enum Expected {
    Attached { id: i64, parent_id: i64 },
    Relocated { id: i64, parent_id: i64 },
    Rejected { id: i64, parent_id: i64 },
    Detached { id: i64 },
    Skipped,
}

impl Model {
    fn new() -> Self {
        Self {
            rows: vec![PositionRow::new(ROOT_ID, Position::new(0, 1, 2, 0))],
            next_id: 2,
        }
    }

    fn pick(&self, index: usize) -> PositionRow {
        self.rows[index % self.rows.len()]
    }

    fn find(&self, id: i64) -> PositionRow {
        *self.rows.iter().find(|r| r.id == id).unwrap()
    }

    fn apply(&mut self, op: &TreeOp) -> Expected {
        match *op {
            TreeOp::Attach { parent } => {
                let parent = self.pick(parent);
                let id = self.next_id;
                self.next_id += 1;
                AttachPlan::compute(id, parent.id, &parent.position()).apply(&mut self.rows);
                Expected::Attached {
                    id,
                    parent_id: parent.id,
                }
            }
            TreeOp::Relocate { node, parent } => {
                let node = self.pick(node);
                let parent = self.pick(parent);
                if node.id == ROOT_ID {
                    return Expected::Skipped;
                }
                match RelocatePlan::compute(node.id, &node.position(), parent.id, &parent.position())
                {
                    Ok(plan) => {
                        plan.apply(&mut self.rows);
                        Expected::Relocated {
                            id: node.id,
                            parent_id: parent.id,
                        }
                    }
                    Err(_) => {
                        assert!(
                            node.id == parent.id || node.position().encloses(&parent.position())
                        );
                        Expected::Rejected {
                            id: node.id,
                            parent_id: parent.id,
                        }
                    }
                }
            }
            TreeOp::Detach { node } => {
                let node = self.pick(node);
                if node.id == ROOT_ID {
                    return Expected::Skipped;
                }
                DetachPlan::compute(node.id, &node.position()).apply(&mut self.rows);
                Expected::Detached { id: node.id }
            }
        }
    }

    fn sorted(&self) -> Vec<PositionRow> {
        let mut rows = self.rows.clone();
        rows.sort_by_key(|r| r.id);
        rows
    }
}

proptest! {
    /// Property: every random sequence keeps the encoding valid
    #[test]
    fn prop_invariants_hold(ops in prop::collection::vec(arb_tree_op(), 0..60)) {
        let mut model = Model::new();
        for op in &ops {
            model.apply(op);
            prop_assert_eq!(check_invariants(&model.rows, ROOT_ID), Ok(()));
        }
    }

    /// Property: attach grows the parent chain by 2 and leaves the rest in place
    #[test]
    fn prop_attach_grows_ancestors_only(
        ops in prop::collection::vec(arb_tree_op(), 0..30),
        parent in 0usize..64,
    ) {
        let mut model = Model::new();
        for op in &ops {
            model.apply(op);
        }
        let before = model.rows.clone();
        let parent_index = parent;
        let parent = model.pick(parent_index);
        model.apply(&TreeOp::Attach { parent: parent_index });

        for old in &before {
            let new = model.find(old.id);
            let pos = old.position();
            if pos.encloses(&parent.position()) || old.id == parent.id {
                prop_assert_eq!((new.lft, new.rgt), (old.lft, old.rgt + 2));
            } else if old.lft > parent.rgt {
                prop_assert_eq!((new.lft, new.rgt), (old.lft + 2, old.rgt + 2));
            } else {
                prop_assert_eq!((new.lft, new.rgt), (old.lft, old.rgt));
            }
            prop_assert_eq!(new.depth, old.depth);
        }
    }

    /// Property: relocate keeps subtree shape and shifts depth uniformly
    #[test]
    fn prop_relocate_preserves_subtree(
        ops in prop::collection::vec(arb_tree_op(), 0..30),
        node in 0usize..64,
        parent in 0usize..64,
    ) {
        let mut model = Model::new();
        for op in &ops {
            model.apply(op);
        }
        let moving = model.pick(node);
        let target = model.pick(parent);
        let before = model.rows.clone();

        if let Expected::Relocated { .. } = model.apply(&TreeOp::Relocate { node, parent }) {
            let moved = model.find(moving.id);
            let depth_change = target.depth + 1 - moving.depth;
            prop_assert_eq!(moved.rgt - moved.lft, moving.rgt - moving.lft);
            prop_assert_eq!(moved.parent_id, target.id);

            for old in before.iter().filter(|r| r.lft >= moving.lft && r.rgt <= moving.rgt) {
                let new = model.find(old.id);
                prop_assert_eq!(new.lft - moved.lft, old.lft - moving.lft);
                prop_assert_eq!(new.rgt - moved.lft, old.rgt - moving.lft);
                prop_assert_eq!(new.depth, old.depth + depth_change);
            }
        }
    }

    /// Property: detach promotes children and shrinks the root by 2
    #[test]
    fn prop_detach_promotes_children(
        ops in prop::collection::vec(arb_tree_op(), 1..30),
        node in 0usize..64,
    ) {
        let mut model = Model::new();
        for op in &ops {
            model.apply(op);
        }
        let removed = model.pick(node);
        let before = model.rows.clone();
        let root_rgt = model.find(ROOT_ID).rgt;

        if let Expected::Detached { .. } = model.apply(&TreeOp::Detach { node }) {
            prop_assert_eq!(model.find(ROOT_ID).rgt, root_rgt - 2);
            for old in before.iter().filter(|r| r.lft > removed.lft && r.rgt < removed.rgt) {
                let new = model.find(old.id);
                prop_assert_eq!(new.depth, old.depth - 1);
                if old.parent_id == removed.id {
                    prop_assert_eq!(new.parent_id, removed.parent_id);
                }
            }
        }
    }

    /// Property: rebuilding a valid tree in lft order changes nothing
    #[test]
    fn prop_rebuild_of_valid_tree_is_identity(ops in prop::collection::vec(arb_tree_op(), 0..40)) {
        let mut model = Model::new();
        for op in &ops {
            model.apply(op);
        }
        let mut rows = model.rows.clone();
        rows.sort_by_key(|r| r.lft);

        let plan = compute_positions(rows.clone(), ROOT_ID, 0).unwrap();
        prop_assert!(plan.changed.is_empty());
        prop_assert!(plan.orphans.is_empty());
        prop_assert_eq!(plan.positions, rows);
    }
}

async fn run_against_engine(ops: Vec<TreeOp>, strategy: RelocateStrategy) -> Result<(), String> {
    let temp_dir = TempDir::new().map_err(|e| e.to_string())?;
    let config = TreeConfig::default().with_relocate_strategy(strategy);
    let db = Arc::new(
        DatabaseService::new(temp_dir.path().join("tree.db"), config)
            .await
            .map_err(|e| e.to_string())?,
    );
    let engine = TreeMutationEngine::new(db.clone());
    let store = TursoStore::new(db.clone());
    let mut model = Model::new();

    for op in &ops {
        match model.apply(op) {
            Expected::Attached { id, parent_id } => {
                let inserted = db
                    .db_insert_node("node", parent_id, "{}")
                    .await
                    .map_err(|e| e.to_string())?;
                if inserted != id {
                    return Err(format!("expected id {}, got {}", id, inserted));
                }
                engine.attach(id).await.map_err(|e| e.to_string())?;
            }
            Expected::Relocated { id, parent_id } => {
                engine
                    .relocate(id, Some(parent_id))
                    .await
                    .map_err(|e| e.to_string())?;
            }
            Expected::Rejected { id, parent_id } => {
                match engine.relocate(id, Some(parent_id)).await {
                    Err(e) if e.is_invariant_violation() => {}
                    other => return Err(format!("expected rejection, got {:?}", other)),
                }
            }
            Expected::Detached { id } => {
                engine
                    .detach(id, Removal::Delete)
                    .await
                    .map_err(|e| e.to_string())?;
            }
            Expected::Skipped => {}
        }
    }

    let mut stored: Vec<PositionRow> = store
        .query_nodes(&NodeQuery::all())
        .await
        .map_err(|e| e.to_string())?
        .iter()
        .map(|n| PositionRow::new(n.id, n.position().unwrap()))
        .collect();
    stored.sort_by_key(|r| r.id);

    check_invariants(&stored, ROOT_ID)?;
    if stored != model.sorted() {
        return Err(format!(
            "stored rows diverged from model:\n{:?}\n{:?}",
            stored,
            model.sorted()
        ));
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    /// Property: the engine matches the in-memory model (excluded-range strategy)
    #[test]
    fn prop_engine_matches_model_excluded_range(ops in prop::collection::vec(arb_tree_op(), 0..25)) {
        let result = tokio_test::block_on(run_against_engine(ops, RelocateStrategy::ExcludedRange));
        prop_assert_eq!(result, Ok(()));
    }

    /// Property: the engine matches the in-memory model (sign-flip strategy)
    #[test]
    fn prop_engine_matches_model_sign_flip(ops in prop::collection::vec(arb_tree_op(), 0..25)) {
        let result = tokio_test::block_on(run_against_engine(ops, RelocateStrategy::SignFlip));
        prop_assert_eq!(result, Ok(()));
    }
}
