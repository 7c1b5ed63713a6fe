#![deny(unsafe_code)]
//! # flowsync-crdt
//!
//! Convergent per-execution state built from concurrent operations.
//!
//! Each execution keeps a base document (the result of the last compaction)
//! and an operation log. The current state is a pure fold of the log over the
//! base, so two replicas holding the same operations compute the same
//! document no matter in which order the operations arrived.
//!
//! ## Operations
//!
//! [`OperationKind`] covers `set`, `delete`, `increment`, `decrement`,
//! `append` and `merge` on dot-separated paths. Increments and decrements
//! always commute; appends commute on paths declared as sets.
//!
//! ## Conflicts
//!
//! Concurrent operations on the same path whose kinds do not commute form a
//! [`ConflictGroup`]. Members in the winner's causal past apply as usual;
//! the remaining contenders are collapsed by the configured
//! [`ResolutionStrategy`] and recorded once as a [`ConflictResolution`].
//!
//! ## Compaction
//!
//! [`CrdtStateManager::compact_state`] folds the causally stable prefix of
//! the log into the base and writes it, together with the folded operations,
//! to the content store. The visible state does not change. Folded
//! operations still reach peers through deltas, and an operation that
//! arrives concurrent with the base reopens it so the fold stays exact.

pub mod config;
pub mod conflict;
pub mod document;
pub mod engine;
pub mod error;
pub mod manager;
pub mod operation;
pub mod order;
pub mod repository;
pub mod resolution;
pub mod state;

pub use config::CrdtConfig;
pub use conflict::{conflict_id, detect_conflicts, ConflictGroup};
pub use engine::{Engine, FoldOutcome, ResolvedGroup};
pub use error::CrdtError;
pub use manager::CrdtStateManager;
pub use operation::{tie_break, CrdtOperation, OperationKind, OperationRequest};
pub use order::causal_order;
pub use repository::{CrdtRepository, InMemoryCrdtRepository};
pub use resolution::{ConflictPolicy, ConflictResolution, ResolutionStrategy};
pub use state::{
    CompactedBase, ConcurrentStateUpdate, CrdtState, MergeReport, StateCompaction, StateDelta,
};
