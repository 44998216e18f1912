//! Database Layer
//!
//! This module handles all database interactions using libsql (embedded
//! SQLite):
//!
//! - [`DatabaseService`] - connection management, schema and root seeding
//! - [`NodeStore`] / [`TursoStore`] - record persistence and filtered reads
//! - [`PositionRepository`] - range updates that maintain nested-set bounds
//!
//! Table and column names come from the [`TreeConfig`](crate::config::TreeConfig)
//! bound to the `DatabaseService`.

mod database;
mod error;
mod node_store;
mod position_repository;
mod turso_store;

pub use database::{DatabaseService, ROOT_NODE_NAME};
pub use error::DatabaseError;
pub use node_store::{NodeOrder, NodeQuery, NodeStore, RangeFilter};
pub use position_repository::{PositionRecord, PositionRepository, Removal};
pub use turso_store::TursoStore;
