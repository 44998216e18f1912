//! Business Services
//!
//! This module contains the services that maintain and read one hierarchy:
//!
//! - `TreeMutationEngine` - Attach, relocate, detach and rebuild in one transaction each
//! - `TreeEventGateway` - Routes tree commands inline or to a task submitter
//! - `SerialTaskWorker` - In-process FIFO submitter for deferred commands
//! - `TreeQueryService` - Interval lookups and nested/flat tree views
//! - `TreeNodeService` - Record lifecycle that raises tree commands
//!
//! Services coordinate between the database layer and the storage-free plans
//! in [`operations`](crate::operations).

pub mod error;
pub mod gateway;
pub mod node_service;
pub mod query_service;
pub mod task_worker;
pub mod tree_engine;

pub use error::NodeServiceError;
pub use gateway::{DispatchOutcome, QueuedTreeTask, TaskSubmitter, TreeCommand, TreeEventGateway};
pub use node_service::{TreeNodeService, TreeNodeUpdate};
pub use query_service::TreeQueryService;
pub use task_worker::{SerialTaskWorker, TaskEvent, TaskWorkerConfig};
pub use tree_engine::TreeMutationEngine;
