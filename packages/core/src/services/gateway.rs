//! Event/Deferral Gateway
//!
//! Routes record lifecycle events to the tree engine, either inline or through
//! an injected [`TaskSubmitter`]. A command carries node ids only; the engine
//! always re-reads persisted state when the command finally runs.
//!
//! # Routing
//!
//! - no deferral configured: the engine runs the command before `dispatch`
//!   returns and the new position is handed back
//! - deferral configured: the command is wrapped in a [`QueuedTreeTask`]
//!   envelope (connection, queue, after-commit flag) and submitted

use crate::config::DeferralConfig;
use crate::db::Removal;
use crate::models::Position;
use crate::operations::TreeOperationError;
use crate::services::TreeMutationEngine;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// One structural change, identified by node ids only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TreeCommand {
    /// A row was inserted and needs bounds
    Created { id: i64 },
    /// A row's parent changed (`None` = root)
    ParentChanged { id: i64, new_parent_id: Option<i64> },
    /// A row is about to go away
    Deleting { id: i64, removal: Removal },
}

impl TreeCommand {
    pub fn node_id(&self) -> i64 {
        match *self {
            Self::Created { id } | Self::ParentChanged { id, .. } | Self::Deleting { id, .. } => id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::ParentChanged { .. } => "parent_changed",
            Self::Deleting { .. } => "deleting",
        }
    }
}

/// Envelope handed to a task submitter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedTreeTask {
    /// Correlation id for logs and outcome events
    pub id: Uuid,
    pub command: TreeCommand,
    pub connection: Option<String>,
    pub queue: Option<String>,
    /// Run only once the enclosing transaction committed
    pub after_commit: bool,
}

impl QueuedTreeTask {
    pub fn new(command: TreeCommand, deferral: &DeferralConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            command,
            connection: deferral.connection.clone(),
            queue: deferral.queue.clone(),
            after_commit: deferral.after_commit,
        }
    }
}

/// Background task dispatch seam
///
/// Implementations accept a task for later execution. Returning `Ok` means
/// the task was accepted, not that it ran.
#[async_trait]
pub trait TaskSubmitter: Send + Sync {
    async fn submit(&self, task: QueuedTreeTask) -> Result<(), TreeOperationError>;
}

/// Result of dispatching one command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Ran inline; carries the new position for `Created` / `ParentChanged`
    Applied(Option<Position>),
    /// Accepted by the task submitter under this task id
    Queued(Uuid),
}

/// Inline-or-deferred router in front of the tree engine
pub struct TreeEventGateway {
    engine: Arc<TreeMutationEngine>,
    submitter: Option<Arc<dyn TaskSubmitter>>,
}

impl TreeEventGateway {
    /// Create a gateway for the engine's hierarchy
    ///
    /// # Errors
    ///
    /// Returns `Configuration` when deferral is enabled without soft delete
    /// or without a task submitter.
    pub fn new(
        engine: Arc<TreeMutationEngine>,
        submitter: Option<Arc<dyn TaskSubmitter>>,
    ) -> Result<Self, TreeOperationError> {
        let config = engine.config();
        if config.queue_enabled() {
            if !config.soft_delete {
                return Err(TreeOperationError::configuration(
                    "soft delete is required when deferred execution is enabled",
                ));
            }
            if submitter.is_none() {
                return Err(TreeOperationError::configuration(
                    "deferred execution is enabled but no task submitter was provided",
                ));
            }
        }

        Ok(Self { engine, submitter })
    }

    pub fn engine(&self) -> &Arc<TreeMutationEngine> {
        &self.engine
    }

    /// Whether commands are queued instead of run inline
    pub fn is_deferred(&self) -> bool {
        self.engine.config().queue_enabled()
    }

    pub async fn dispatch(&self, command: TreeCommand) -> Result<DispatchOutcome, TreeOperationError> {
        let deferral = self
            .engine
            .config()
            .deferral
            .as_ref()
            .filter(|d| d.is_enabled());

        match (deferral, &self.submitter) {
            (Some(deferral), Some(submitter)) => {
                let task = QueuedTreeTask::new(command, deferral);
                let task_id = task.id;
                tracing::debug!(
                    "Queueing tree command {} for node {} as task {}",
                    command.kind(),
                    command.node_id(),
                    task_id
                );
                submitter.submit(task).await?;
                Ok(DispatchOutcome::Queued(task_id))
            }
            _ => {
                let position = self.engine.execute(&command).await?;
                Ok(DispatchOutcome::Applied(position))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TreeConfig;
    use crate::db::DatabaseService;
    use tempfile::TempDir;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingSubmitter {
        tasks: Mutex<Vec<QueuedTreeTask>>,
    }

    #[async_trait]
    impl TaskSubmitter for RecordingSubmitter {
        async fn submit(&self, task: QueuedTreeTask) -> Result<(), TreeOperationError> {
            self.tasks.lock().await.push(task);
            Ok(())
        }
    }

    struct RefusingSubmitter;

    #[async_trait]
    impl TaskSubmitter for RefusingSubmitter {
        async fn submit(&self, _task: QueuedTreeTask) -> Result<(), TreeOperationError> {
            Err(TreeOperationError::dispatch("queue is closed"))
        }
    }

    fn deferred_config() -> TreeConfig {
        TreeConfig::default()
            .with_soft_delete(true)
            .with_deferral(DeferralConfig {
                connection: Some("redis".to_string()),
                queue: Some("tree".to_string()),
                after_commit: false,
            })
    }

    async fn engine(config: TreeConfig) -> (Arc<TreeMutationEngine>, Arc<DatabaseService>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = Arc::new(
            DatabaseService::new(temp_dir.path().join("test.db"), config)
                .await
                .unwrap(),
        );
        (Arc::new(TreeMutationEngine::new(db.clone())), db, temp_dir)
    }

    #[test]
    fn test_command_serializes_ids_only() {
        let command = TreeCommand::Deleting {
            id: 7,
            removal: Removal::Keep,
        };
        let value = serde_json::to_value(command).unwrap();
        assert_eq!(value["type"], "deleting");
        assert_eq!(value["id"], 7);
        assert_eq!(value["removal"], "keep");

        let back: TreeCommand = serde_json::from_value(value).unwrap();
        assert_eq!(back, command);
        assert_eq!(back.node_id(), 7);
    }

    #[tokio::test]
    async fn test_inline_dispatch_applies_immediately() {
        let (engine, db, _temp_dir) = engine(TreeConfig::default()).await;
        let gateway = TreeEventGateway::new(engine, None).unwrap();
        assert!(!gateway.is_deferred());

        let id = db.db_insert_node("A", 1, "{}").await.unwrap();
        let outcome = gateway.dispatch(TreeCommand::Created { id }).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Applied(Some(Position::new(1, 2, 3, 1))));

        let outcome = gateway
            .dispatch(TreeCommand::Deleting {
                id,
                removal: Removal::Delete,
            })
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Applied(None));
    }

    #[tokio::test]
    async fn test_deferred_dispatch_builds_envelope() {
        let (engine, db, _temp_dir) = engine(deferred_config()).await;
        let submitter = Arc::new(RecordingSubmitter::default());
        let gateway = TreeEventGateway::new(engine, Some(submitter.clone())).unwrap();
        assert!(gateway.is_deferred());

        let id = db.db_insert_node("A", 1, "{}").await.unwrap();
        let outcome = gateway.dispatch(TreeCommand::Created { id }).await.unwrap();

        let tasks = submitter.tasks.lock().await;
        assert_eq!(tasks.len(), 1);
        assert_eq!(outcome, DispatchOutcome::Queued(tasks[0].id));
        assert_eq!(tasks[0].command, TreeCommand::Created { id });
        assert_eq!(tasks[0].connection.as_deref(), Some("redis"));
        assert_eq!(tasks[0].queue.as_deref(), Some("tree"));
        assert!(!tasks[0].after_commit);

        // nothing ran yet
        let row = db.db_get_node(id).await.unwrap().unwrap();
        let lft: Option<i64> = row.get(3).unwrap();
        assert!(lft.is_none());
    }

    #[tokio::test]
    async fn test_deferral_requires_submitter() {
        let (engine, _db, _temp_dir) = engine(deferred_config()).await;
        let err = TreeEventGateway::new(engine, None).err().unwrap();
        assert!(matches!(err, TreeOperationError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_submitter_refusal_is_dispatch_error() {
        let (engine, _db, _temp_dir) = engine(deferred_config()).await;
        let gateway = TreeEventGateway::new(engine, Some(Arc::new(RefusingSubmitter))).unwrap();

        let err = gateway
            .dispatch(TreeCommand::Created { id: 2 })
            .await
            .unwrap_err();
        assert!(matches!(err, TreeOperationError::Dispatch { .. }));
    }
}
