//! End-to-end test: a partition exported by one node is imported, validated
//! and extended by another.

use std::sync::Arc;

use flowsync_adapters::{ContentStore, Ed25519Signer, InMemoryContentStore};
use flowsync_events::EventBus;
use flowsync_ledger::{AppendRequest, ExecutionLedger, LedgerConfig, LedgerError};
use flowsync_types::{ExecutionId, NodeId};

async fn node(name: &str, seed: u8, trusts: u8, store: Arc<InMemoryContentStore>) -> ExecutionLedger {
    let signer = Ed25519Signer::from_seed([seed; 32])
        .with_trusted_peer(Ed25519Signer::from_seed([trusts; 32]).verifying_key());
    let ledger = ExecutionLedger::in_memory(
        LedgerConfig {
            node_id: NodeId::from(name),
            ..LedgerConfig::default()
        },
        Arc::new(signer),
        store,
        Arc::new(EventBus::new()),
    );
    ledger.initialize().await.unwrap();
    ledger
}

#[tokio::test]
async fn imported_partition_validates_and_continues() {
    let store = Arc::new(InMemoryContentStore::new());
    let writer = node("n1", 1, 2, store.clone()).await;
    let reader = node("n2", 2, 1, store).await;
    let exec = ExecutionId::from("e1");

    for step in ["s1", "s2"] {
        writer
            .append_record(AppendRequest::new("e1", step, "cid", "alice"))
            .await
            .unwrap();
    }
    let snapshot = writer.export_ledger(Some(&exec)).await.unwrap();
    assert_eq!(reader.import_ledger(snapshot).await.unwrap(), 1);

    let v = reader.validate_ledger(&exec).await;
    assert!(v.is_valid, "{:?}", v.errors);
    assert_eq!(reader.vector_clock().await.get(&NodeId::from("n1")), 2);

    let third = reader
        .append_record(AppendRequest::new("e1", "s3", "cid", "bob"))
        .await
        .unwrap();
    let entries = reader.get_execution_records(&exec).await.unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(third.prev_hash, entries[1].record.record_hash);
    assert!(entries[1].record.vector_clock.happened_before(&third.vector_clock));
    assert!(reader.validate_ledger(&exec).await.is_valid);
}

#[tokio::test]
async fn snapshot_round_trips_through_content_store() {
    let store = Arc::new(InMemoryContentStore::new());
    let writer = node("n1", 1, 2, store.clone()).await;
    let reader = node("n2", 2, 1, store.clone()).await;

    writer
        .append_record(AppendRequest::new("e1", "s1", "cid", "alice"))
        .await
        .unwrap();
    writer
        .append_record(AppendRequest::new("e2", "s1", "cid", "alice"))
        .await
        .unwrap();

    let id = writer.persist_snapshot(None).await.unwrap();
    assert!(store.contains(&id).await.unwrap());
    assert_eq!(reader.restore_snapshot(&id).await.unwrap(), 2);
    assert_eq!(
        reader.export_ledger(None).await.unwrap().executions,
        writer.export_ledger(None).await.unwrap().executions
    );
}

#[tokio::test]
async fn import_is_refused_during_replay() {
    let store = Arc::new(InMemoryContentStore::new());
    let writer = node("n1", 1, 2, store.clone()).await;
    let reader = node("n2", 2, 1, store).await;
    let exec = ExecutionId::from("e1");

    writer
        .append_record(AppendRequest::new("e1", "s1", "cid", "alice"))
        .await
        .unwrap();
    let snapshot = writer.export_ledger(None).await.unwrap();
    reader.import_ledger(snapshot.clone()).await.unwrap();

    reader.start_replay(&exec).await.unwrap();
    let err = reader.import_ledger(snapshot).await.unwrap_err();
    assert!(matches!(err, LedgerError::ReplayInProgress(_)));
}
