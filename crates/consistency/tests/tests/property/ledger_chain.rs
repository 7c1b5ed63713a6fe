//! Property tests: any sequence of appends yields valid chains, replays
//! return records in append order, and any single tampered record is caught.

use std::collections::BTreeMap;

use flowsync_ledger::{AppendRequest, LedgerRepository};
use flowsync_tests::ledger_with_repository;
use flowsync_types::{ContentId, ExecutionId};
use proptest::prelude::*;

fn arb_appends() -> impl Strategy<Value = Vec<(usize, String)>> {
    prop::collection::vec((0usize..3, "[a-z]{1,8}"), 1..25)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn every_chain_validates_after_appends(appends in arb_appends()) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (ledger, _) = ledger_with_repository("n1", 9).await;
            let mut expected: BTreeMap<ExecutionId, Vec<String>> = BTreeMap::new();

            for (exec, step) in &appends {
                let exec_id = ExecutionId::new(format!("e{}", exec));
                ledger
                    .append_record(AppendRequest::new(exec_id.clone(), step.as_str(), "cid", "actor"))
                    .await
                    .unwrap();
                expected.entry(exec_id).or_default().push(step.clone());
            }

            for (exec_id, steps) in &expected {
                let v = ledger.validate_ledger(exec_id).await;
                prop_assert!(v.is_valid, "{:?}", v.errors);
                prop_assert_eq!(v.record_count as usize, steps.len());

                ledger.start_replay(exec_id).await.unwrap();
                let mut replayed = Vec::new();
                while let Some(record) = ledger.get_next_replay_record(exec_id).await.unwrap() {
                    replayed.push(record.step_id.as_str().to_string());
                }
                ledger.complete_replay(exec_id).await.unwrap();
                prop_assert_eq!(&replayed, steps);
            }
            Ok(())
        })?;
    }

    #[test]
    fn tampering_any_record_is_detected(
        count in 1usize..10,
        victim in any::<prop::sample::Index>(),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (ledger, repository) = ledger_with_repository("n1", 9).await;
            let exec_id = ExecutionId::from("e1");
            for i in 0..count {
                ledger
                    .append_record(AppendRequest::new("e1", format!("s{}", i), "cid", "actor"))
                    .await
                    .unwrap();
            }

            let index = victim.index(count);
            let mut entries = repository.entries(&exec_id).await.unwrap();
            entries[index].record.payload_cid = ContentId::from("forged");
            repository.replace(&exec_id, entries).await.unwrap();

            let v = ledger.validate_ledger(&exec_id).await;
            prop_assert!(!v.is_valid);
            prop_assert!(!v.chain_integrity);
            let prefix = format!("record {}", index);
            prop_assert!(v.errors.iter().any(|e| e.starts_with(&prefix)), "{:?}", v.errors);
            Ok(())
        })?;
    }
}
