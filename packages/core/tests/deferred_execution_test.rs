//! Deferred Execution Tests
//!
//! Runs the record service in deferred mode against an in-process serial
//! worker and checks that queued commands re-read persisted state when they
//! finally run.

use nestedset_core::config::{DeferralConfig, TreeConfig};
use nestedset_core::db::{DatabaseError, DatabaseService, NodeQuery, NodeStore};
use nestedset_core::models::{NewTreeNode, PositionRow, PositionedNode};
use nestedset_core::operations::{check_invariants, TreeOperationError};
use nestedset_core::services::{
    NodeServiceError, QueuedTreeTask, SerialTaskWorker, TaskEvent, TaskSubmitter,
    TaskWorkerConfig, TreeMutationEngine, TreeNodeService,
};
use async_trait::async_trait;
use std::sync::Arc;
use tempfile::TempDir;

fn deferred_config() -> TreeConfig {
    TreeConfig::new("categories")
        .with_soft_delete(true)
        .with_deferral(DeferralConfig {
            queue: Some("tree".to_string()),
            ..Default::default()
        })
}

async fn create_deferred_service() -> (TreeNodeService, Arc<SerialTaskWorker>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db = Arc::new(
        DatabaseService::new(temp_dir.path().join("tree.db"), deferred_config())
            .await
            .unwrap(),
    );
    let worker = Arc::new(SerialTaskWorker::spawn(
        Arc::new(TreeMutationEngine::new(db.clone())),
        TaskWorkerConfig::default(),
    ));
    let submitter: Arc<dyn TaskSubmitter> = worker.clone();
    let service = TreeNodeService::new(db, Some(submitter)).unwrap();
    (service, worker, temp_dir)
}

async fn assert_valid(service: &TreeNodeService) {
    let rows: Vec<PositionRow> = service
        .store()
        .query_nodes(&NodeQuery::all())
        .await
        .unwrap()
        .iter()
        .map(|n| PositionRow::new(n.id, n.position().unwrap()))
        .collect();
    check_invariants(&rows, 1).unwrap();
}

async fn bounds(service: &TreeNodeService, id: i64) -> (Option<i64>, Option<i64>, Option<i64>, Option<i64>) {
    let node = service.get_node(id).await.unwrap().unwrap();
    (node.parent_id, node.lft, node.rgt, node.depth)
}

#[tokio::test]
async fn test_deferred_lifecycle() {
    let (service, worker, _temp) = create_deferred_service().await;
    let mut events = worker.subscribe();

    let a = service.create_node(NewTreeNode::new("A")).await.unwrap();
    assert!(a.lft.is_none(), "bounds are written by the worker");
    worker.flush().await.unwrap();
    assert_eq!(bounds(&service, a.id).await, (Some(1), Some(2), Some(3), Some(1)));

    let b = service
        .create_node(NewTreeNode::new("B").under(a.id))
        .await
        .unwrap();
    worker.flush().await.unwrap();
    assert_eq!(bounds(&service, b.id).await, (Some(a.id), Some(3), Some(4), Some(2)));

    // stored parent is kept until the queued move runs
    let pending = service.update_parent(b.id, None).await.unwrap();
    assert_eq!(pending.parent_id, Some(a.id));
    worker.flush().await.unwrap();
    assert_eq!(bounds(&service, b.id).await, (Some(1), Some(4), Some(5), Some(1)));

    // the record is trashed at once, the detach runs later
    assert!(service.delete_node(a.id).await.unwrap());
    assert!(service.get_node(a.id).await.unwrap().unwrap().is_trashed());
    worker.flush().await.unwrap();
    assert_eq!(bounds(&service, b.id).await, (Some(1), Some(2), Some(3), Some(1)));
    assert_eq!(bounds(&service, 1).await, (Some(0), Some(1), Some(4), Some(0)));
    assert_valid(&service).await;

    for _ in 0..4 {
        let event = events.recv().await.unwrap();
        assert!(matches!(event, TaskEvent::Completed { .. }), "{:?}", event);
    }
}

#[tokio::test]
async fn test_commands_queued_back_to_back_keep_tree_valid() {
    let (service, worker, _temp) = create_deferred_service().await;
    let mut events = worker.subscribe();

    let a = service.create_node(NewTreeNode::new("A")).await.unwrap();
    let c = service
        .create_node(NewTreeNode::new("C").under(a.id))
        .await
        .unwrap();
    let b = service.create_node(NewTreeNode::new("B")).await.unwrap();
    worker.flush().await.unwrap();
    assert_eq!(bounds(&service, 1).await, (Some(0), Some(1), Some(8), Some(0)));

    // no flush in between: each command runs against the previous one's result
    assert!(service.delete_node(a.id).await.unwrap());
    assert!(service.delete_node(b.id).await.unwrap());
    let d = service.create_node(NewTreeNode::new("D")).await.unwrap();
    service.update_parent(c.id, Some(d.id)).await.unwrap();
    worker.flush().await.unwrap();

    assert_eq!(bounds(&service, d.id).await, (Some(1), Some(2), Some(5), Some(1)));
    assert_eq!(bounds(&service, c.id).await, (Some(d.id), Some(3), Some(4), Some(2)));
    assert_eq!(bounds(&service, 1).await, (Some(0), Some(1), Some(6), Some(0)));
    for id in [a.id, b.id] {
        let (_, lft, rgt, depth) = bounds(&service, id).await;
        assert_eq!((lft, rgt, depth), (None, None, None));
    }
    assert_valid(&service).await;

    let e = service.create_node(NewTreeNode::new("E")).await.unwrap();
    worker.flush().await.unwrap();
    assert_eq!(bounds(&service, e.id).await, (Some(1), Some(6), Some(7), Some(1)));
    assert_valid(&service).await;

    for _ in 0..8 {
        let event = events.recv().await.unwrap();
        assert!(matches!(event, TaskEvent::Completed { .. }), "{:?}", event);
    }
}

struct ClosedQueue;

#[async_trait]
impl TaskSubmitter for ClosedQueue {
    async fn submit(&self, _task: QueuedTreeTask) -> Result<(), TreeOperationError> {
        Err(TreeOperationError::dispatch("closed"))
    }
}

#[tokio::test]
async fn test_refused_delete_restores_record() {
    let temp_dir = TempDir::new().unwrap();
    let db = Arc::new(
        DatabaseService::new(temp_dir.path().join("tree.db"), deferred_config())
            .await
            .unwrap(),
    );
    let engine = TreeMutationEngine::new(db.clone());
    let a = db.db_insert_node("A", 1, "{}").await.unwrap();
    engine.attach(a).await.unwrap();
    let b = db.db_insert_node("B", a, "{}").await.unwrap();
    engine.attach(b).await.unwrap();

    let service = TreeNodeService::new(db, Some(Arc::new(ClosedQueue))).unwrap();
    let err = service.delete_node(a).await.unwrap_err();
    assert!(matches!(
        err,
        NodeServiceError::TreeError(TreeOperationError::Dispatch { .. })
    ));

    assert!(!service.get_node(a).await.unwrap().unwrap().is_trashed());
    assert_eq!(bounds(&service, a).await, (Some(1), Some(2), Some(5), Some(1)));
    assert_eq!(bounds(&service, b).await, (Some(a), Some(3), Some(4), Some(2)));
    assert_valid(&service).await;
}

#[tokio::test]
async fn test_queued_command_for_vanished_row_fails_cleanly() {
    let (service, worker, _temp) = create_deferred_service().await;
    let mut events = worker.subscribe();

    let c = service.create_node(NewTreeNode::new("C")).await.unwrap();
    // removed behind the service's back before the worker gets to it
    assert!(service.store().delete_node(c.id).await.unwrap());
    worker.flush().await.unwrap();

    match events.recv().await.unwrap() {
        TaskEvent::Failed {
            node_id, attempts, ..
        } => {
            assert_eq!(node_id, c.id);
            assert_eq!(attempts, 1);
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert_valid(&service).await;
}

#[tokio::test]
async fn test_deferral_without_submitter_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let db = Arc::new(
        DatabaseService::new(temp_dir.path().join("tree.db"), deferred_config())
            .await
            .unwrap(),
    );

    let err = TreeNodeService::new(db, None).err().unwrap();
    assert!(matches!(
        err,
        NodeServiceError::TreeError(TreeOperationError::Configuration(_))
    ));
}

#[tokio::test]
async fn test_deferral_without_soft_delete_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let config = deferred_config().with_soft_delete(false);

    let err = DatabaseService::new(temp_dir.path().join("tree.db"), config)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, DatabaseError::Configuration(_)));
}
