//! Fixtures shared by the integration and property tests.

use std::sync::Arc;

use flowsync_adapters::{Ed25519Signer, InMemoryContentStore};
use flowsync_crdt::{CrdtConfig, CrdtStateManager, MergeReport, ResolutionStrategy};
use flowsync_events::EventBus;
use flowsync_ledger::{ExecutionLedger, InMemoryLedgerRepository, LedgerConfig};
use flowsync_types::{ExecutionId, NodeId};

/// An initialized ledger whose repository the caller can reach around.
pub async fn ledger_with_repository(
    node: &str,
    seed: u8,
) -> (ExecutionLedger, InMemoryLedgerRepository) {
    let repository = InMemoryLedgerRepository::new();
    let ledger = ExecutionLedger::new(
        LedgerConfig {
            node_id: NodeId::from(node),
            ..LedgerConfig::default()
        },
        Arc::new(Ed25519Signer::from_seed([seed; 32])),
        Arc::new(InMemoryContentStore::new()),
        Arc::new(repository.clone()),
        Arc::new(EventBus::new()),
    );
    ledger
        .initialize()
        .await
        .expect("in-memory ledger initializes");
    (ledger, repository)
}

pub async fn ledger(node: &str, seed: u8) -> ExecutionLedger {
    ledger_with_repository(node, seed).await.0
}

pub fn crdt(node: &str) -> CrdtStateManager {
    crdt_with(node, ResolutionStrategy::LastWriteWins, &[])
}

pub fn crdt_with(node: &str, strategy: ResolutionStrategy, set_paths: &[&str]) -> CrdtStateManager {
    crdt_configured(CrdtConfig {
        node_id: NodeId::from(node),
        strategy,
        set_paths: set_paths.iter().map(|p| p.to_string()).collect(),
        ..CrdtConfig::default()
    })
}

/// A manager that compacts on its own once its log passes `threshold`.
pub fn crdt_auto_compacting(
    node: &str,
    strategy: ResolutionStrategy,
    set_paths: &[&str],
    threshold: usize,
) -> CrdtStateManager {
    crdt_configured(CrdtConfig {
        node_id: NodeId::from(node),
        strategy,
        set_paths: set_paths.iter().map(|p| p.to_string()).collect(),
        auto_compact_threshold: Some(threshold),
        ..CrdtConfig::default()
    })
}

fn crdt_configured(config: CrdtConfig) -> CrdtStateManager {
    CrdtStateManager::in_memory(
        config,
        Arc::new(InMemoryContentStore::new()),
        Arc::new(EventBus::new()),
    )
}

/// Push everything `from` holds for `exec_id` into `to`.
pub async fn sync(
    from: &CrdtStateManager,
    to: &CrdtStateManager,
    exec_id: &ExecutionId,
) -> MergeReport {
    let delta = from
        .create_state_delta(exec_id, None)
        .await
        .expect("delta from in-memory manager");
    to.merge_concurrent_updates(vec![delta.into_update(from.node_id().clone())])
        .await
        .expect("merge into in-memory manager")
}
