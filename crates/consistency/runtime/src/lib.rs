#![deny(unsafe_code)]
//! # flowsync-runtime
//!
//! Assembles a node of the consistency core from a TOML file:
//!
//! - [`ConsistencyConfig`] with `[ledger]` and `[crdt]` sections and the
//!   `FLOWSYNC_NODE_ID` override
//! - [`ConsistencyCore`] owning the ledger, the CRDT state manager, their
//!   shared event bus and content store
//! - [`telemetry::init_tracing`] for binaries
//! - the `flowsync` CLI in [`cli`]

pub mod cli;
pub mod config;
pub mod error;
pub mod node;
pub mod telemetry;

pub use config::{ConsistencyConfig, CrdtSection, LedgerSection, NODE_ID_ENV};
pub use error::{ConfigError, CoreError, CoreResult};
pub use node::ConsistencyCore;
