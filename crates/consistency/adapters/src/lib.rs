#![deny(unsafe_code)]
//! # flowsync-adapters
//!
//! The two collaborators the consistency core consumes but does not own:
//!
//! - [`ContentStore`]: `put(bytes) -> id`, `get(id) -> bytes`, used to persist
//!   ledger snapshots and compacted CRDT states
//! - [`Signer`]: `sign(bytes)`, `verify(bytes, signature)`, used to make
//!   ledger records tamper-evident
//!
//! Adapter calls are the only potentially slow operations of the core, so
//! callers bound them with [`with_timeout`]. Retries belong to the adapter.

pub mod error;
pub mod signer;
pub mod store;
pub mod timeout;

pub use error::AdapterError;
pub use signer::{Ed25519Signer, Signature, Signer};
pub use store::{content_id_of, ContentStore, FileContentStore, InMemoryContentStore};
pub use timeout::with_timeout;
