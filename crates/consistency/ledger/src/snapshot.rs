use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use flowsync_types::{ExecutionId, NodeId, VectorClock};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::record::LedgerEntry;

pub const SNAPSHOT_VERSION: u32 = 1;

/// Portable export of one or all ledger partitions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSnapshot {
    pub version: u32,
    pub node_id: NodeId,
    pub exported_at: DateTime<Utc>,
    pub vector_clock: VectorClock,
    pub executions: BTreeMap<ExecutionId, Vec<LedgerEntry>>,
}

impl LedgerSnapshot {
    pub fn record_count(&self) -> usize {
        self.executions.values().map(Vec::len).sum()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, LedgerError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LedgerError> {
        let snapshot: LedgerSnapshot = serde_json::from_slice(bytes)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(LedgerError::InvalidSnapshot(format!(
                "unsupported snapshot version {} (expected {})",
                snapshot.version, SNAPSHOT_VERSION
            )));
        }
        Ok(snapshot)
    }
}
