#[path = "property/ledger_chain.rs"]
mod ledger_chain;

#[path = "property/crdt_convergence.rs"]
mod crdt_convergence;
