#[path = "e2e/ledger_integrity.rs"]
mod ledger_integrity;

#[path = "e2e/replay_order.rs"]
mod replay_order;

#[path = "e2e/snapshot_transfer.rs"]
mod snapshot_transfer;

#[path = "e2e/crdt_convergence.rs"]
mod crdt_convergence;

#[path = "e2e/compaction.rs"]
mod compaction;
