//! NestedSet Core - Nested-Set Hierarchy Maintenance
//!
//! This crate keeps a modified-preorder-tree-traversal (MPTT) encoding of a
//! hierarchy in sync with ordinary record operations. Every row carries
//! `parent_id`, `lft`, `rgt` and `depth`; ancestor, descendant and subtree
//! lookups become single range predicates.
//!
//! # Architecture
//!
//! - **Hidden Root**: Each hierarchy owns a synthetic root row (id 1 by default)
//!   that encloses every other node and is invisible to scoped queries
//! - **Transactional Mutations**: Attach, relocate, detach and rebuild each run
//!   as one `BEGIN IMMEDIATE` transaction and roll back on any failure
//! - **libsql/Turso**: Embedded SQLite-compatible storage
//! - **Optional Deferral**: Tree commands can be queued to a task submitter
//!   instead of running inline
//!
//! # Modules
//!
//! - [`config`] - Per-hierarchy configuration (table, columns, root, deferral)
//! - [`models`] - Records, positions and nested tree views
//! - [`operations`] - Storage-free interval arithmetic and rebuild walk
//! - [`db`] - Database layer with libsql integration
//! - [`services`] - Mutation engine, gateway, worker, query and record services
//! - [`telemetry`] - `tracing` subscriber setup

pub mod config;
pub mod db;
pub mod models;
pub mod operations;
pub mod services;
pub mod telemetry;

// Re-export commonly used types
pub use config::{DeferralConfig, RelocateStrategy, TreeColumns, TreeConfig};
pub use db::{DatabaseService, NodeStore, TursoStore};
pub use models::*;
pub use operations::TreeOperationError;
pub use services::*;
