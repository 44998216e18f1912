//! Tree Operations
//!
//! Storage-free building blocks of the mutation engine:
//!
//! - [`interval`] - Attach, relocate and detach plans over `lft`/`rgt` bounds
//! - [`rebuild`] - Full position recomputation from parent links
//! - [`error`] - The error type every tree operation returns
//!
//! The engine in `services::tree_engine` turns these plans into SQL; the
//! property tests apply them to in-memory rows.

pub mod error;
pub mod interval;
pub mod rebuild;

pub use error::TreeOperationError;
pub use interval::{check_invariants, AttachPlan, BoundRange, DetachPlan, MoveDirection, RelocatePlan};
pub use rebuild::{compute_positions, RebuildPlan, RebuildReport};
