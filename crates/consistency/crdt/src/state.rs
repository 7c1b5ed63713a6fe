use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use flowsync_types::{ContentId, Digest, ExecutionId, NodeId, OperationId, VectorClock};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::operation::CrdtOperation;
use crate::resolution::ConflictResolution;

/// Everything the manager holds for one execution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrdtState {
    pub execution_id: ExecutionId,
    /// Result of the last compaction.
    pub base_state: Value,
    /// Merged clock of every operation folded into `base_state`.
    pub base_clock: VectorClock,
    /// Newest [`CompactedBase`] behind `base_state`.
    #[serde(default)]
    pub base_content_id: Option<ContentId>,
    /// Ids of every operation folded into `base_state`.
    #[serde(default)]
    pub folded_ids: BTreeSet<OperationId>,
    pub operations: Vec<CrdtOperation>,
    /// Merged clock of every operation held, folded or live.
    pub vector_clock: VectorClock,
    /// Last clock each peer reported with an update.
    #[serde(default)]
    pub peer_clocks: BTreeMap<NodeId, VectorClock>,
    pub last_compacted: Option<DateTime<Utc>>,
    pub conflict_resolutions: Vec<ConflictResolution>,
    pub compactions: Vec<StateCompaction>,
    /// `base_state` folded with `operations`, refreshed on every mutation.
    pub current_state: Value,
}

impl CrdtState {
    pub fn new(execution_id: ExecutionId) -> Self {
        Self {
            execution_id,
            base_state: Value::Object(Map::new()),
            base_clock: VectorClock::new(),
            base_content_id: None,
            folded_ids: BTreeSet::new(),
            operations: Vec::new(),
            vector_clock: VectorClock::new(),
            peer_clocks: BTreeMap::new(),
            last_compacted: None,
            conflict_resolutions: Vec::new(),
            compactions: Vec::new(),
            current_state: Value::Object(Map::new()),
        }
    }

    pub fn contains(&self, id: &OperationId) -> bool {
        self.operations.iter().any(|op| op.operation_id == *id)
    }

    /// Clock every known replica has reached: the pointwise min of the local
    /// clock and each peer's last reported clock.
    pub fn stable_clock(&self) -> VectorClock {
        self.peer_clocks
            .values()
            .fold(self.vector_clock.clone(), |stable, peer| stable.meet(peer))
    }

    /// Whether folding the base and then `op` could differ from folding
    /// everything together: `op` does not causally follow the whole base.
    pub fn precedes_base(&self, op: &CrdtOperation) -> bool {
        !self.base_clock.is_covered_by(&op.vector_clock)
    }

    /// Operations no other operation in the log names as a dependency.
    pub fn heads(&self) -> Vec<OperationId> {
        let referenced: HashSet<&OperationId> = self
            .operations
            .iter()
            .flat_map(|op| op.causality.iter())
            .collect();
        let mut heads: Vec<OperationId> = self
            .operations
            .iter()
            .map(|op| &op.operation_id)
            .filter(|id| !referenced.contains(id))
            .cloned()
            .collect();
        heads.sort();
        heads
    }

    pub fn has_resolution(&self, conflict_id: &Digest) -> bool {
        self.conflict_resolutions
            .iter()
            .any(|r| r.conflict_id == *conflict_id)
    }
}

/// Record of one compaction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateCompaction {
    pub compaction_id: String,
    pub execution_id: ExecutionId,
    pub before_operation_count: usize,
    pub after_operation_count: usize,
    pub compacted_state: Value,
    pub compacted_at: DateTime<Utc>,
    /// Where the compacted base was written in the content store.
    pub content_id: ContentId,
    pub cutoff: VectorClock,
}

/// Blob written to the content store on compaction.
///
/// Each blob carries the operations that compaction folded and links to the
/// blob before it, so the full history stays recoverable for peers that
/// join late and for reopening the base.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactedBase {
    pub execution_id: ExecutionId,
    pub base_state: Value,
    pub base_clock: VectorClock,
    #[serde(default)]
    pub operations: Vec<CrdtOperation>,
    #[serde(default)]
    pub previous: Option<ContentId>,
}

/// A batch of operations from another node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConcurrentStateUpdate {
    pub execution_id: ExecutionId,
    pub source_node: NodeId,
    pub operations: Vec<CrdtOperation>,
    pub vector_clock: VectorClock,
}

/// Operations a peer is missing, relative to `since`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateDelta {
    pub execution_id: ExecutionId,
    pub operations: Vec<CrdtOperation>,
    pub vector_clock: VectorClock,
    #[serde(default)]
    pub since: Option<VectorClock>,
}

impl StateDelta {
    pub fn into_update(self, source_node: NodeId) -> ConcurrentStateUpdate {
        ConcurrentStateUpdate {
            execution_id: self.execution_id,
            source_node,
            operations: self.operations,
            vector_clock: self.vector_clock,
        }
    }
}

/// Totals from one `merge_concurrent_updates` call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeReport {
    pub applied: usize,
    /// Already in the log, or already folded into the base.
    pub duplicates: usize,
    pub malformed: usize,
    pub conflicts_resolved: usize,
}
