//! End-to-end test: replicas exchanging deltas converge on the same state
//! and the same conflict records.

use chrono::{TimeZone, Utc};
use flowsync_crdt::{OperationRequest, ResolutionStrategy};
use flowsync_tests::{crdt, crdt_with, sync};
use flowsync_types::ExecutionId;
use serde_json::json;

fn exec() -> ExecutionId {
    ExecutionId::from("e1")
}

#[tokio::test]
async fn concurrent_increments_sum_without_resolutions() {
    let nodes = [crdt("n1"), crdt("n2"), crdt("n3")];
    for (i, node) in nodes.iter().enumerate() {
        node.apply_operation(&exec(), OperationRequest::increment("counter", (i + 1) as f64))
            .await
            .unwrap();
        node.apply_operation(&exec(), OperationRequest::decrement("counter", 1.0))
            .await
            .unwrap();
    }

    for from in &nodes {
        for to in &nodes {
            if from.node_id() != to.node_id() {
                sync(from, to, &exec()).await;
            }
        }
    }

    for node in &nodes {
        assert_eq!(
            node.get_current_state(&exec()).await.unwrap(),
            json!({"counter": 3})
        );
        assert!(node.get_conflict_resolutions(&exec()).await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn set_conflict_resolves_identically_in_either_merge_order() {
    let at = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
    let n1 = crdt("n1");
    let n2 = crdt("n2");
    n1.apply_operation(&exec(), OperationRequest::set("owner", json!("alice")).at(at))
        .await
        .unwrap();
    n2.apply_operation(&exec(), OperationRequest::set("owner", json!("bob")).at(at))
        .await
        .unwrap();

    // Each side merges the other's delta, so arrival order differs.
    sync(&n2, &n1, &exec()).await;
    sync(&n1, &n2, &exec()).await;

    let s1 = n1.get_current_state(&exec()).await.unwrap();
    let s2 = n2.get_current_state(&exec()).await.unwrap();
    assert_eq!(s1, s2);
    assert_eq!(s1, json!({"owner": "alice"}));

    let r1 = n1.get_conflict_resolutions(&exec()).await.unwrap();
    let r2 = n2.get_conflict_resolutions(&exec()).await.unwrap();
    assert_eq!(r1.len(), 1);
    assert_eq!(r2.len(), 1);
    assert_eq!(r1[0].conflict_id, r2[0].conflict_id);
    assert_eq!(r1[0].operation_ids, r2[0].operation_ids);
    assert_eq!(r1[0].resolved_value, json!("alice"));
    assert_eq!(r1[0].resolution_strategy, ResolutionStrategy::LastWriteWins);
}

#[tokio::test]
async fn causally_later_write_is_not_a_conflict() {
    let n1 = crdt("n1");
    let n2 = crdt("n2");
    n1.apply_operation(&exec(), OperationRequest::set("phase", json!("draft")))
        .await
        .unwrap();
    sync(&n1, &n2, &exec()).await;
    n2.apply_operation(&exec(), OperationRequest::set("phase", json!("final")))
        .await
        .unwrap();
    sync(&n2, &n1, &exec()).await;

    for node in [&n1, &n2] {
        assert_eq!(
            node.get_current_state(&exec()).await.unwrap(),
            json!({"phase": "final"})
        );
        assert!(node.get_conflict_resolutions(&exec()).await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn set_paths_union_concurrent_appends() {
    let n1 = crdt_with("n1", ResolutionStrategy::LastWriteWins, &["labels"]);
    let n2 = crdt_with("n2", ResolutionStrategy::LastWriteWins, &["labels"]);
    n1.apply_operation(&exec(), OperationRequest::append("labels", json!("urgent")))
        .await
        .unwrap();
    n2.apply_operation(&exec(), OperationRequest::append("labels", json!("billing")))
        .await
        .unwrap();
    n2.apply_operation(&exec(), OperationRequest::append("labels", json!("urgent")))
        .await
        .unwrap();

    sync(&n1, &n2, &exec()).await;
    sync(&n2, &n1, &exec()).await;

    let s1 = n1.get_current_state(&exec()).await.unwrap();
    assert_eq!(s1, n2.get_current_state(&exec()).await.unwrap());
    let labels = s1["labels"].as_array().unwrap();
    assert_eq!(labels.len(), 2);
    assert!(n1.get_conflict_resolutions(&exec()).await.unwrap().is_empty());
}

#[tokio::test]
async fn merge_strategy_keeps_concurrent_map_keys() {
    let n1 = crdt_with("n1", ResolutionStrategy::Merge, &[]);
    let n2 = crdt_with("n2", ResolutionStrategy::Merge, &[]);
    n1.apply_operation(&exec(), OperationRequest::set("meta", json!({"region": "eu"})))
        .await
        .unwrap();
    n2.apply_operation(
        &exec(),
        OperationRequest::merge("meta", json!({"tier": "gold"}).as_object().unwrap().clone()),
    )
    .await
    .unwrap();

    sync(&n1, &n2, &exec()).await;
    sync(&n2, &n1, &exec()).await;

    for node in [&n1, &n2] {
        assert_eq!(
            node.get_current_state(&exec()).await.unwrap(),
            json!({"meta": {"region": "eu", "tier": "gold"}})
        );
    }
}

#[tokio::test]
async fn redelivered_updates_are_duplicates() {
    let n1 = crdt("n1");
    let n2 = crdt("n2");
    n1.apply_operation(&exec(), OperationRequest::set("x", json!(1)))
        .await
        .unwrap();

    let first = sync(&n1, &n2, &exec()).await;
    let again = sync(&n1, &n2, &exec()).await;
    assert_eq!(first.applied, 1);
    assert_eq!(again.applied, 0);
    assert_eq!(again.duplicates, 1);
    assert_eq!(n2.get_operation_log(&exec()).await.unwrap().len(), 1);
}
