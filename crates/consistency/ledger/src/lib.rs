#![deny(unsafe_code)]
//! # flowsync-ledger
//!
//! Execution Ledger: an append-only, hash-chained, signed record of every
//! step transition of every execution.
//!
//! - Each record links to its predecessor through `prevHash`; the first
//!   record of an execution links to [`flowsync_types::GENESIS_HASH`]
//! - Each record carries the ledger's vector clock and a signature over its
//!   hash, so tampering with any stored field is detectable
//! - A replay cursor walks an execution's records in order and accumulates
//!   a state hash, blocking appends to that execution until completed
//! - Snapshots move partitions between nodes, directly or through a
//!   [`flowsync_adapters::ContentStore`]

pub mod config;
pub mod error;
pub mod ledger;
pub mod record;
pub mod replay;
pub mod repository;
pub mod snapshot;
pub mod validation;

pub use config::LedgerConfig;
pub use error::LedgerError;
pub use ledger::ExecutionLedger;
pub use record::{AppendRequest, ExecutionRecord, LedgerEntry, RecordContent};
pub use replay::{ReplayState, ReplaySummary};
pub use repository::{InMemoryLedgerRepository, LedgerRepository};
pub use snapshot::{LedgerSnapshot, SNAPSHOT_VERSION};
pub use validation::{ChainValidator, LedgerValidation};
