//! Property tests: replicas that receive the same operations in any order
//! compute the same state and record the same conflicts, whether or not
//! they compact along the way.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use flowsync_crdt::{
    ConcurrentStateUpdate, ConflictResolution, CrdtOperation, OperationRequest, ResolutionStrategy,
};
use flowsync_tests::{crdt_auto_compacting, crdt_with};
use flowsync_types::{Digest, ExecutionId, NodeId, VectorClock};
use proptest::prelude::*;
use serde_json::{json, Map};

const NODES: [&str; 3] = ["n1", "n2", "n3"];
const SET_PATHS: [&str; 1] = ["tags"];

fn arb_request() -> impl Strategy<Value = OperationRequest> {
    prop_oneof![
        (prop::sample::select(vec!["status", "owner", "cfg.mode"]), 0i64..4)
            .prop_map(|(path, v)| OperationRequest::set(path, json!(v))),
        prop::sample::select(vec!["status", "owner"]).prop_map(|p| OperationRequest::delete(p)),
        (1i64..5).prop_map(|d| OperationRequest::increment("count", d as f64)),
        (1i64..5).prop_map(|d| OperationRequest::decrement("count", d as f64)),
        (0i64..3).prop_map(|v| OperationRequest::append("tags", json!(v))),
        (0i64..3).prop_map(|v| OperationRequest::append("history", json!(v))),
        (prop::sample::select(vec!["a", "b"]), 0i64..3).prop_map(|(k, v)| {
            let mut entries = Map::new();
            entries.insert(k.to_string(), json!(v));
            OperationRequest::merge("meta", entries)
        }),
    ]
}

/// Per node: whether it first catches up on the nodes before it, then its
/// local operations, each with a small timestamp offset so that ties are
/// common.
fn arb_workload() -> impl Strategy<Value = Vec<(bool, Vec<(OperationRequest, i64)>)>> {
    prop::collection::vec(
        (any::<bool>(), prop::collection::vec((arb_request(), 0i64..3), 0..6)),
        NODES.len(),
    )
}

fn strategy() -> impl Strategy<Value = ResolutionStrategy> {
    prop_oneof![
        Just(ResolutionStrategy::LastWriteWins),
        Just(ResolutionStrategy::Merge),
    ]
}

fn epoch() -> DateTime<Utc> {
    DateTime::from_timestamp(1_800_000_000, 0).unwrap()
}

/// Run each node's workload and return every operation it authored.
async fn generate(
    exec: &ExecutionId,
    workload: &[(bool, Vec<(OperationRequest, i64)>)],
    strategy: ResolutionStrategy,
) -> Vec<CrdtOperation> {
    let mut all: Vec<CrdtOperation> = Vec::new();
    for (node, (catch_up, requests)) in NODES.iter().zip(workload) {
        let source = crdt_with(node, strategy, &SET_PATHS);
        if *catch_up && !all.is_empty() {
            let updates = all.iter().cloned().map(|op| single(exec, op)).collect();
            source.merge_concurrent_updates(updates).await.unwrap();
        }
        for (request, offset) in requests {
            let request = request.clone().at(epoch() + Duration::seconds(*offset));
            source.apply_operation(exec, request).await.unwrap();
        }
        let authored: Vec<CrdtOperation> = source
            .get_operation_log(exec)
            .await
            .unwrap()
            .into_iter()
            .filter(|op| op.node_id.as_str() == *node)
            .collect();
        all.extend(authored);
    }
    all
}

fn single(exec: &ExecutionId, op: CrdtOperation) -> ConcurrentStateUpdate {
    ConcurrentStateUpdate {
        execution_id: exec.clone(),
        source_node: op.node_id.clone(),
        vector_clock: op.vector_clock.clone(),
        operations: vec![op],
    }
}

fn ordered(all: &[CrdtOperation], order: &[usize]) -> Vec<CrdtOperation> {
    order.iter().map(|&i| all[i].clone()).collect()
}

/// Two permutations of `0..n` derived from `seed`.
fn permutations(n: usize, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut first: Vec<usize> = (0..n).collect();
    let mut second: Vec<usize> = (0..n).rev().collect();
    let mut s = seed;
    for i in (1..n).rev() {
        s = s.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        first.swap(i, (s >> 33) as usize % (i + 1));
        s = s.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        second.swap(i, (s >> 33) as usize % (i + 1));
    }
    (first, second)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn delivery_order_does_not_change_state(
        workload in arb_workload(),
        strategy in strategy(),
        seed in any::<u64>(),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let exec = ExecutionId::from("e1");
            let all = generate(&exec, &workload, strategy).await;

            let (first, second) = permutations(all.len(), seed);

            let one_by_one = crdt_with("r1", strategy, &SET_PATHS);
            for op in ordered(&all, &first) {
                one_by_one.merge_concurrent_updates(vec![single(&exec, op)]).await.unwrap();
            }

            let batched = crdt_with("r2", strategy, &SET_PATHS);
            let updates = ordered(&all, &second)
                .into_iter()
                .map(|op| single(&exec, op))
                .collect();
            batched.merge_concurrent_updates(updates).await.unwrap();

            let a = one_by_one.get_current_state(&exec).await.unwrap();
            let b = batched.get_current_state(&exec).await.unwrap();
            prop_assert_eq!(&a, &b);

            // A replica that sees everything at once records only the final
            // conflict groups; incremental replicas record those too.
            let at_once = crdt_with("r3", strategy, &SET_PATHS);
            at_once
                .merge_concurrent_updates(vec![ConcurrentStateUpdate {
                    execution_id: exec.clone(),
                    source_node: NodeId::from("all"),
                    vector_clock: VectorClock::new(),
                    operations: all.clone(),
                }])
                .await
                .unwrap();
            prop_assert_eq!(&at_once.get_current_state(&exec).await.unwrap(), &a);

            let recorded_by = |resolutions: Vec<ConflictResolution>| -> BTreeSet<Digest> {
                resolutions.into_iter().map(|r| r.conflict_id).collect()
            };
            let finals = recorded_by(at_once.get_conflict_resolutions(&exec).await.unwrap());
            let seen_a = recorded_by(one_by_one.get_conflict_resolutions(&exec).await.unwrap());
            let seen_b = recorded_by(batched.get_conflict_resolutions(&exec).await.unwrap());
            prop_assert!(finals.is_subset(&seen_a));
            prop_assert!(finals.is_subset(&seen_b));
            Ok(())
        })?;
    }

    #[test]
    fn compacting_replicas_agree_with_plain_ones(
        workload in arb_workload(),
        strategy in strategy(),
        seed in any::<u64>(),
        every in 1usize..4,
        threshold in 1usize..4,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let exec = ExecutionId::from("e1");
            let all = generate(&exec, &workload, strategy).await;
            let (first, second) = permutations(all.len(), seed);

            let plain = crdt_with("r0", strategy, &SET_PATHS);
            for op in ordered(&all, &first) {
                plain.merge_concurrent_updates(vec![single(&exec, op)]).await.unwrap();
            }
            let expected = plain.get_current_state(&exec).await.unwrap();

            // Compacts by hand every few deliveries, alternating between the
            // stable cutoff and everything held so far.
            let manual = crdt_with("r1", strategy, &SET_PATHS);
            for (k, op) in ordered(&all, &first).into_iter().enumerate() {
                manual.merge_concurrent_updates(vec![single(&exec, op)]).await.unwrap();
                if (k + 1) % every == 0 {
                    let cutoff = if k % 2 == 0 {
                        None
                    } else {
                        Some(manual.get_vector_clock(&exec).await.unwrap())
                    };
                    manual.compact_state(&exec, cutoff).await.unwrap();
                }
            }
            prop_assert_eq!(&manual.get_current_state(&exec).await.unwrap(), &expected);

            let auto = crdt_auto_compacting("r2", strategy, &SET_PATHS, threshold);
            for op in ordered(&all, &second) {
                auto.merge_concurrent_updates(vec![single(&exec, op)]).await.unwrap();
            }
            prop_assert_eq!(&auto.get_current_state(&exec).await.unwrap(), &expected);

            // A fresh replica fed only by a compacted one gets the full history.
            let joiner = crdt_with("r3", strategy, &SET_PATHS);
            let delta = manual.create_state_delta(&exec, None).await.unwrap();
            let report = joiner
                .merge_concurrent_updates(vec![delta.into_update(NodeId::from("r1"))])
                .await
                .unwrap();
            prop_assert_eq!(report.applied, all.len());
            prop_assert_eq!(&joiner.get_current_state(&exec).await.unwrap(), &expected);
            prop_assert_eq!(
                joiner.get_vector_clock(&exec).await.unwrap(),
                plain.get_vector_clock(&exec).await.unwrap()
            );
            Ok(())
        })?;
    }

    #[test]
    fn concurrent_counters_always_sum(
        deltas in prop::collection::vec(prop::collection::vec(-5i64..6, 0..5), NODES.len()),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let exec = ExecutionId::from("e1");
            let replica = crdt_with("r", ResolutionStrategy::LastWriteWins, &[]);
            let mut expected = 0i64;
            let mut updates = Vec::new();

            for (node, node_deltas) in NODES.iter().zip(&deltas) {
                let source = crdt_with(node, ResolutionStrategy::LastWriteWins, &[]);
                for d in node_deltas {
                    let request = if *d >= 0 {
                        OperationRequest::increment("count", *d as f64)
                    } else {
                        OperationRequest::decrement("count", (-d) as f64)
                    };
                    source.apply_operation(&exec, request).await.unwrap();
                    expected += d;
                }
                let delta = source.create_state_delta(&exec, None).await.unwrap();
                updates.push(delta.into_update(NodeId::from(*node)));
            }
            updates.reverse();
            replica.merge_concurrent_updates(updates).await.unwrap();

            let state = replica.get_current_state(&exec).await.unwrap();
            if deltas.iter().all(|d| d.is_empty()) {
                prop_assert_eq!(state, json!({}));
            } else {
                prop_assert_eq!(state, json!({ "count": expected }));
            }
            prop_assert!(replica.get_conflict_resolutions(&exec).await.unwrap().is_empty());
            Ok(())
        })?;
    }
}
