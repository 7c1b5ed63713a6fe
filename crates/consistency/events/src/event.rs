use std::fmt;

use chrono::{DateTime, Utc};
use flowsync_types::{ContentId, Digest, ExecutionId, NodeId, OperationId, StepId};
use serde::{Deserialize, Serialize};

/// Topic of a [`ConsistencyEvent`], used for subscription filtering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    LedgerInitialized,
    RecordAppended,
    ReplayStarted,
    ReplayCompleted,
    OperationApplied,
    ConflictResolved,
    StateCompacted,
}

impl EventTopic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LedgerInitialized => "ledger.initialized",
            Self::RecordAppended => "ledger.record.appended",
            Self::ReplayStarted => "ledger.replay.started",
            Self::ReplayCompleted => "ledger.replay.completed",
            Self::OperationApplied => "crdt.operation.applied",
            Self::ConflictResolved => "crdt.conflict.resolved",
            Self::StateCompacted => "crdt.state.compacted",
        }
    }

    /// Topics published by the execution ledger.
    pub fn ledger() -> Vec<EventTopic> {
        vec![
            Self::LedgerInitialized,
            Self::RecordAppended,
            Self::ReplayStarted,
            Self::ReplayCompleted,
        ]
    }

    /// Topics published by the CRDT state manager.
    pub fn crdt() -> Vec<EventTopic> {
        vec![
            Self::OperationApplied,
            Self::ConflictResolved,
            Self::StateCompacted,
        ]
    }
}

impl fmt::Display for EventTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event published by the consistency core.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum ConsistencyEvent {
    #[serde(rename = "ledger.initialized", rename_all = "camelCase")]
    LedgerInitialized {
        node_id: NodeId,
        timestamp: DateTime<Utc>,
    },

    #[serde(rename = "ledger.record.appended", rename_all = "camelCase")]
    RecordAppended {
        exec_id: ExecutionId,
        step_id: StepId,
        record_hash: Digest,
        index: u64,
        node_id: NodeId,
        timestamp: DateTime<Utc>,
    },

    #[serde(rename = "ledger.replay.started", rename_all = "camelCase")]
    ReplayStarted {
        exec_id: ExecutionId,
        record_count: u64,
        timestamp: DateTime<Utc>,
    },

    #[serde(rename = "ledger.replay.completed", rename_all = "camelCase")]
    ReplayCompleted {
        exec_id: ExecutionId,
        final_step_index: u64,
        final_state_hash: Digest,
        /// Milliseconds between `start_replay` and `complete_replay`.
        replay_duration: u64,
        timestamp: DateTime<Utc>,
    },

    #[serde(rename = "crdt.operation.applied", rename_all = "camelCase")]
    OperationApplied {
        exec_id: ExecutionId,
        operation_id: OperationId,
        operation_type: String,
        path: String,
        node_id: NodeId,
        timestamp: DateTime<Utc>,
    },

    #[serde(rename = "crdt.conflict.resolved", rename_all = "camelCase")]
    ConflictResolved {
        exec_id: ExecutionId,
        conflict_id: Digest,
        operation_ids: Vec<OperationId>,
        path: String,
        strategy: String,
        resolved_by: NodeId,
        timestamp: DateTime<Utc>,
    },

    #[serde(rename = "crdt.state.compacted", rename_all = "camelCase")]
    StateCompacted {
        exec_id: ExecutionId,
        compaction_id: String,
        before_operation_count: u64,
        after_operation_count: u64,
        content_id: ContentId,
        timestamp: DateTime<Utc>,
    },
}

impl ConsistencyEvent {
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::LedgerInitialized { .. } => EventTopic::LedgerInitialized,
            Self::RecordAppended { .. } => EventTopic::RecordAppended,
            Self::ReplayStarted { .. } => EventTopic::ReplayStarted,
            Self::ReplayCompleted { .. } => EventTopic::ReplayCompleted,
            Self::OperationApplied { .. } => EventTopic::OperationApplied,
            Self::ConflictResolved { .. } => EventTopic::ConflictResolved,
            Self::StateCompacted { .. } => EventTopic::StateCompacted,
        }
    }

    /// The execution this event concerns, if any.
    pub fn execution_id(&self) -> Option<&ExecutionId> {
        match self {
            Self::LedgerInitialized { .. } => None,
            Self::RecordAppended { exec_id, .. }
            | Self::ReplayStarted { exec_id, .. }
            | Self::ReplayCompleted { exec_id, .. }
            | Self::OperationApplied { exec_id, .. }
            | Self::ConflictResolved { exec_id, .. }
            | Self::StateCompacted { exec_id, .. } => Some(exec_id),
        }
    }
}
