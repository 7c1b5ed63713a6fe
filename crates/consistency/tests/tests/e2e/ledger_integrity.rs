//! End-to-end test: appended chains validate, and any tampering is reported
//! at the index where it happened.

use flowsync_ledger::{AppendRequest, LedgerRepository};
use flowsync_tests::{ledger, ledger_with_repository};
use flowsync_types::{ContentId, Digest, ExecutionId, GENESIS_HASH};

fn request(exec: &str, step: &str) -> AppendRequest {
    AppendRequest::new(exec, step, format!("cid-{}", step), "alice")
}

#[tokio::test]
async fn two_appends_validate() {
    let ledger = ledger("n1", 1).await;
    ledger.append_record(request("e1", "s1")).await.unwrap();
    ledger.append_record(request("e1", "s2")).await.unwrap();

    let v = ledger.validate_ledger(&ExecutionId::from("e1")).await;
    assert!(v.is_valid, "{:?}", v.errors);
    assert!(v.chain_integrity);
    assert!(v.signature_validity);
    assert!(v.causal_consistency);
    assert_eq!(v.record_count, 2);
}

#[tokio::test]
async fn chain_links_from_genesis() {
    let ledger = ledger("n1", 1).await;
    let first = ledger.append_record(request("e1", "s1")).await.unwrap();
    let second = ledger.append_record(request("e1", "s2")).await.unwrap();
    let other = ledger.append_record(request("e2", "s1")).await.unwrap();

    assert_eq!(first.prev_hash, GENESIS_HASH);
    assert_eq!(second.prev_hash, first.record_hash);
    assert_eq!(other.prev_hash, GENESIS_HASH);
    assert!(first.vector_clock.happened_before(&second.vector_clock));
}

#[tokio::test]
async fn tampered_payload_is_detected_at_its_index() {
    let (ledger, repository) = ledger_with_repository("n1", 1).await;
    let exec = ExecutionId::from("e1");
    for step in ["s1", "s2", "s3"] {
        ledger.append_record(request("e1", step)).await.unwrap();
    }

    let mut entries = repository.entries(&exec).await.unwrap();
    entries[1].record.payload_cid = ContentId::from("forged");
    repository.replace(&exec, entries).await.unwrap();

    let v = ledger.validate_ledger(&exec).await;
    assert!(!v.is_valid);
    assert!(!v.chain_integrity);
    assert!(v.errors.iter().any(|e| e.starts_with("record 1")), "{:?}", v.errors);
}

#[tokio::test]
async fn rehashed_forgery_still_fails_signature_and_link() {
    let (ledger, repository) = ledger_with_repository("n1", 1).await;
    let exec = ExecutionId::from("e1");
    for step in ["s1", "s2"] {
        ledger.append_record(request("e1", step)).await.unwrap();
    }

    // A forger who recomputes the hash cannot re-sign it.
    let mut entries = repository.entries(&exec).await.unwrap();
    entries[0].record.actor = "mallory".into();
    entries[0].record.record_hash = entries[0].record.compute_hash();
    repository.replace(&exec, entries).await.unwrap();

    let v = ledger.validate_ledger(&exec).await;
    assert!(!v.is_valid);
    assert!(!v.signature_validity);
    assert!(!v.chain_integrity);
    assert!(v.errors.iter().any(|e| e.starts_with("record 1")), "{:?}", v.errors);
}

#[tokio::test]
async fn removed_record_breaks_the_chain() {
    let (ledger, repository) = ledger_with_repository("n1", 1).await;
    let exec = ExecutionId::from("e1");
    for step in ["s1", "s2", "s3"] {
        ledger.append_record(request("e1", step)).await.unwrap();
    }

    let mut entries = repository.entries(&exec).await.unwrap();
    entries.remove(1);
    repository.replace(&exec, entries).await.unwrap();

    let v = ledger.validate_ledger(&exec).await;
    assert!(!v.chain_integrity);
}

#[tokio::test]
async fn foreign_record_hash_is_not_genesis() {
    let (ledger, repository) = ledger_with_repository("n1", 1).await;
    let exec = ExecutionId::from("e1");
    ledger.append_record(request("e1", "s1")).await.unwrap();

    let mut entries = repository.entries(&exec).await.unwrap();
    entries[0].record.prev_hash = Digest::hash(b"elsewhere");
    repository.replace(&exec, entries).await.unwrap();

    let v = ledger.validate_ledger(&exec).await;
    assert!(!v.chain_integrity);
    assert!(v.errors.iter().any(|e| e.contains("genesis")), "{:?}", v.errors);
}
