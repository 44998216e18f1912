//! Serial Task Worker
//!
//! In-process [`TaskSubmitter`] that runs queued tree commands one at a time,
//! in submission order, on a spawned tokio task. Structural commands on one
//! hierarchy must never interleave; a single consumer gives that for free.
//!
//! Store failures are retried with exponential backoff (10ms, 20ms, 40ms, ...).
//! Invariant violations and missing nodes fail immediately. Every task ends
//! with a [`TaskEvent`] on the broadcast channel.

use crate::models::Position;
use crate::operations::TreeOperationError;
use crate::services::gateway::{QueuedTreeTask, TaskSubmitter};
use crate::services::TreeMutationEngine;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use uuid::Uuid;

/// Outcome of one queued task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    Completed {
        task_id: Uuid,
        node_id: i64,
        position: Option<Position>,
    },
    Failed {
        task_id: Uuid,
        node_id: i64,
        attempts: u32,
        error: String,
    },
}

impl TaskEvent {
    pub fn task_id(&self) -> Uuid {
        match self {
            Self::Completed { task_id, .. } | Self::Failed { task_id, .. } => *task_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskWorkerConfig {
    /// Total attempts per task, including the first
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub channel_capacity: usize,
}

impl Default for TaskWorkerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 10,
            channel_capacity: 256,
        }
    }
}

enum WorkerMessage {
    Task(QueuedTreeTask),
    Flush(oneshot::Sender<()>),
}

/// Single-consumer queue in front of the tree engine
///
/// Dropping the worker closes the channel; tasks already accepted still run.
pub struct SerialTaskWorker {
    sender: mpsc::Sender<WorkerMessage>,
    events: broadcast::Sender<TaskEvent>,
}

impl SerialTaskWorker {
    /// Spawn the worker loop
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(engine: Arc<TreeMutationEngine>, config: TaskWorkerConfig) -> Self {
        let capacity = config.channel_capacity.max(1);
        let (sender, mut receiver) = mpsc::channel::<WorkerMessage>(capacity);
        let (events, _) = broadcast::channel(capacity);

        let events_tx = events.clone();
        tokio::spawn(async move {
            tracing::info!("SerialTaskWorker started");
            while let Some(message) = receiver.recv().await {
                match message {
                    WorkerMessage::Task(task) => {
                        let event = Self::run_task(&engine, &config, task).await;
                        // No subscribers is fine
                        let _ = events_tx.send(event);
                    }
                    WorkerMessage::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            tracing::info!("SerialTaskWorker shutting down");
        });

        Self { sender, events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.events.subscribe()
    }

    /// Wait until every task submitted before this call has finished
    pub async fn flush(&self) -> Result<(), TreeOperationError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.sender
            .send(WorkerMessage::Flush(done_tx))
            .await
            .map_err(|_| TreeOperationError::dispatch("task worker has shut down"))?;
        done_rx
            .await
            .map_err(|_| TreeOperationError::dispatch("task worker stopped before flushing"))
    }

    async fn run_task(
        engine: &TreeMutationEngine,
        config: &TaskWorkerConfig,
        task: QueuedTreeTask,
    ) -> TaskEvent {
        let node_id = task.command.node_id();
        let max_attempts = config.max_attempts.max(1);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            match engine.execute(&task.command).await {
                Ok(position) => {
                    if attempt > 1 {
                        tracing::debug!(
                            "Tree task {} succeeded after {} attempt(s)",
                            task.id,
                            attempt
                        );
                    }
                    return TaskEvent::Completed {
                        task_id: task.id,
                        node_id,
                        position,
                    };
                }
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    tracing::debug!(
                        "Tree task {} ({} on node {}) failed on attempt {}/{}: {}. Retrying...",
                        task.id,
                        task.command.kind(),
                        node_id,
                        attempt,
                        max_attempts,
                        e
                    );
                    tokio::time::sleep(backoff_delay(config.base_backoff_ms, attempt)).await;
                }
                Err(e) => {
                    tracing::error!(
                        "Tree task {} ({} on node {}) failed: {}",
                        task.id,
                        task.command.kind(),
                        node_id,
                        e
                    );
                    return TaskEvent::Failed {
                        task_id: task.id,
                        node_id,
                        attempts: attempt,
                        error: e.to_string(),
                    };
                }
            }
        }
    }
}

#[async_trait]
impl TaskSubmitter for SerialTaskWorker {
    async fn submit(&self, task: QueuedTreeTask) -> Result<(), TreeOperationError> {
        self.sender
            .send(WorkerMessage::Task(task))
            .await
            .map_err(|_| TreeOperationError::dispatch("task worker has shut down"))
    }
}

/// Delay after failed `attempt` (1-based): `base_ms * 2^(attempt - 1)`, saturating
fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let factor = 1u64
        .checked_shl(attempt.saturating_sub(1))
        .unwrap_or(u64::MAX);
    Duration::from_millis(base_ms.saturating_mul(factor))
}
