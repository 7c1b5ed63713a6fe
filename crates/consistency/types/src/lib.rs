#![deny(unsafe_code)]
//! # flowsync-types
//!
//! Primitives shared by every crate of the execution consistency core:
//!
//! - [`NodeId`], [`ExecutionId`], [`StepId`], [`OperationId`], [`ContentId`]:
//!   string identifiers with transparent JSON encoding
//! - [`Digest`]: BLAKE3 digest rendered as 64 hex characters, plus the
//!   ledger's [`GENESIS_HASH`]
//! - [`VectorClock`] / [`CausalOrder`]: per-node logical counters and their
//!   partial order
//! - [`PartitionLocks`]: one async mutex per execution partition

pub mod digest;
pub mod error;
pub mod ids;
pub mod locks;
pub mod vector_clock;

pub use digest::{Digest, GENESIS_HASH};
pub use error::TypesError;
pub use ids::{ContentId, ExecutionId, NodeId, OperationId, StepId};
pub use locks::PartitionLocks;
pub use vector_clock::{CausalOrder, VectorClock};
