//! End-to-end test: compaction folds history without changing what readers
//! see, and the compacted base lands in the content store.

use std::sync::Arc;

use flowsync_adapters::{ContentStore, InMemoryContentStore};
use flowsync_crdt::{CompactedBase, CrdtConfig, CrdtStateManager, OperationRequest};
use flowsync_events::EventBus;
use flowsync_tests::{crdt, sync};
use flowsync_types::{ExecutionId, NodeId};
use serde_json::json;

fn exec() -> ExecutionId {
    ExecutionId::from("e1")
}

#[tokio::test]
async fn compaction_preserves_state_and_clears_log() {
    let store = Arc::new(InMemoryContentStore::new());
    let manager = CrdtStateManager::in_memory(
        CrdtConfig {
            node_id: NodeId::from("n1"),
            ..CrdtConfig::default()
        },
        store.clone(),
        Arc::new(EventBus::new()),
    );
    manager
        .apply_operation(&exec(), OperationRequest::set("status", json!("running")))
        .await
        .unwrap();
    manager
        .apply_operation(&exec(), OperationRequest::increment("done", 3.0))
        .await
        .unwrap();
    manager
        .apply_operation(&exec(), OperationRequest::append("log", json!("a")))
        .await
        .unwrap();

    let before = manager.get_current_state(&exec()).await.unwrap();
    let compaction = manager.compact_state(&exec(), None).await.unwrap();

    assert_eq!(manager.get_current_state(&exec()).await.unwrap(), before);
    assert!(manager.get_operation_log(&exec()).await.unwrap().is_empty());
    assert_eq!(compaction.before_operation_count, 3);
    assert_eq!(compaction.after_operation_count, 0);
    assert_eq!(compaction.compacted_state, before);

    let bytes = store.get(&compaction.content_id).await.unwrap();
    let base: CompactedBase = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(base.base_state, before);
    assert_eq!(base.base_clock.get(&NodeId::from("n1")), 3);
    assert_eq!(base.operations.len(), 3);
    assert!(base.previous.is_none());

    // A second compaction links back to the first blob.
    manager
        .apply_operation(&exec(), OperationRequest::increment("done", 1.0))
        .await
        .unwrap();
    let second = manager.compact_state(&exec(), None).await.unwrap();
    let bytes = store.get(&second.content_id).await.unwrap();
    let base: CompactedBase = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(base.previous, Some(compaction.content_id));
    assert_eq!(base.operations.len(), 1);
}

#[tokio::test]
async fn partial_cutoff_keeps_later_operations() {
    let manager = crdt("n1");
    manager
        .apply_operation(&exec(), OperationRequest::set("a", json!(1)))
        .await
        .unwrap();
    let cutoff = manager.get_vector_clock(&exec()).await.unwrap();
    manager
        .apply_operation(&exec(), OperationRequest::set("b", json!(2)))
        .await
        .unwrap();

    let before = manager.get_current_state(&exec()).await.unwrap();
    let compaction = manager.compact_state(&exec(), Some(cutoff)).await.unwrap();
    assert_eq!(compaction.after_operation_count, 1);

    let log = manager.get_operation_log(&exec()).await.unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].path, "b");
    assert_eq!(manager.get_current_state(&exec()).await.unwrap(), before);
}

#[tokio::test]
async fn compacted_replica_still_converges_with_new_work() {
    let n1 = crdt("n1");
    let n2 = crdt("n2");
    n1.apply_operation(&exec(), OperationRequest::increment("n", 5.0))
        .await
        .unwrap();
    sync(&n1, &n2, &exec()).await;

    n2.compact_state(&exec(), None).await.unwrap();
    // Re-sending what was folded changes nothing.
    let report = sync(&n1, &n2, &exec()).await;
    assert_eq!(report.duplicates, 1);

    n1.apply_operation(&exec(), OperationRequest::increment("n", 1.0))
        .await
        .unwrap();
    n2.apply_operation(&exec(), OperationRequest::increment("n", 2.0))
        .await
        .unwrap();
    sync(&n1, &n2, &exec()).await;
    sync(&n2, &n1, &exec()).await;

    assert_eq!(n1.get_current_state(&exec()).await.unwrap(), json!({"n": 8}));
    assert_eq!(n2.get_current_state(&exec()).await.unwrap(), json!({"n": 8}));
    assert_eq!(n2.get_compactions(&exec()).await.unwrap().len(), 1);
}
