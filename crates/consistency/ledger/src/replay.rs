use std::time::Instant;

use chrono::{DateTime, Utc};
use flowsync_types::{Digest, ExecutionId, VectorClock};
use serde::{Deserialize, Serialize};

use crate::record::ExecutionRecord;

/// Progress of an active replay.
///
/// `state_hash` is `H(recordHash_0 ‖ … ‖ recordHash_{k-1})` over the records
/// returned so far; with none returned it is the hash of empty input.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayState {
    pub exec_id: ExecutionId,
    pub current_step_index: u64,
    pub vector_clock: VectorClock,
    pub state_hash: Digest,
    pub is_replaying: bool,
    pub replay_start_time: DateTime<Utc>,
}

/// Returned by `complete_replay`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaySummary {
    pub exec_id: ExecutionId,
    pub final_step_index: u64,
    pub final_state_hash: Digest,
    pub records_replayed: u64,
    pub total_records: u64,
    /// Milliseconds
    pub replay_duration: u64,
}

/// Cursor over a frozen copy of an execution's records.
pub(crate) struct ReplayCursor {
    state: ReplayState,
    hasher: blake3::Hasher,
    records: Vec<ExecutionRecord>,
    started: Instant,
}

impl ReplayCursor {
    pub(crate) fn start(exec_id: ExecutionId, records: Vec<ExecutionRecord>) -> Self {
        let hasher = blake3::Hasher::new();
        let state = ReplayState {
            exec_id,
            current_step_index: 0,
            vector_clock: VectorClock::new(),
            state_hash: Digest::from_bytes(*hasher.finalize().as_bytes()),
            is_replaying: true,
            replay_start_time: Utc::now(),
        };
        Self {
            state,
            hasher,
            records,
            started: Instant::now(),
        }
    }

    pub(crate) fn state(&self) -> &ReplayState {
        &self.state
    }

    pub(crate) fn total(&self) -> usize {
        self.records.len()
    }

    /// Advance by one record, folding it into the replay state.
    pub(crate) fn next_record(&mut self) -> Option<ExecutionRecord> {
        let record = self
            .records
            .get(self.state.current_step_index as usize)
            .cloned()?;
        self.hasher.update(record.record_hash.as_bytes());
        self.state.state_hash = Digest::from_bytes(*self.hasher.finalize().as_bytes());
        self.state.vector_clock = record.vector_clock.clone();
        self.state.current_step_index += 1;
        Some(record)
    }

    pub(crate) fn finish(self) -> ReplaySummary {
        ReplaySummary {
            exec_id: self.state.exec_id,
            final_step_index: self.state.current_step_index,
            final_state_hash: self.state.state_hash,
            records_replayed: self.state.current_step_index,
            total_records: self.records.len() as u64,
            replay_duration: self.started.elapsed().as_millis() as u64,
        }
    }
}
