use chrono::{DateTime, SecondsFormat, Utc};
use flowsync_adapters::Signature;
use flowsync_types::{ContentId, Digest, ExecutionId, NodeId, StepId, VectorClock};
use serde::{Deserialize, Serialize};

const RECORD_DOMAIN: &str = "flowsync-record-v1:";

/// Caller-supplied part of a record.
///
/// `node_id` defaults to the ledger's own node and `timestamp` to now.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendRequest {
    pub exec_id: ExecutionId,
    pub step_id: StepId,
    #[serde(rename = "payloadCID")]
    pub payload_cid: ContentId,
    pub actor: String,
    #[serde(default)]
    pub node_id: Option<NodeId>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl AppendRequest {
    pub fn new(
        exec_id: impl Into<ExecutionId>,
        step_id: impl Into<StepId>,
        payload_cid: impl Into<ContentId>,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            exec_id: exec_id.into(),
            step_id: step_id.into(),
            payload_cid: payload_cid.into(),
            actor: actor.into(),
            node_id: None,
            timestamp: None,
        }
    }

    pub fn with_node(mut self, node_id: impl Into<NodeId>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Every hashed field of a record, before it is signed.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordContent {
    pub exec_id: ExecutionId,
    pub step_id: StepId,
    pub prev_hash: Digest,
    pub payload_cid: ContentId,
    pub actor: String,
    pub node_id: NodeId,
    pub timestamp: DateTime<Utc>,
    pub vector_clock: VectorClock,
}

impl RecordContent {
    pub fn digest(&self) -> Digest {
        hash_fields(
            &self.exec_id,
            &self.step_id,
            &self.prev_hash,
            &self.payload_cid,
            &self.actor,
            &self.node_id,
            &self.timestamp,
            &self.vector_clock,
        )
    }
}

/// One step transition in an execution's hash chain.
///
/// `recordHash = H(execId‖stepId‖prevHash‖payloadCID‖actor‖nodeId‖timestamp‖vectorClock)`.
/// Immutable once appended.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub exec_id: ExecutionId,
    pub step_id: StepId,
    pub prev_hash: Digest,
    #[serde(rename = "payloadCID")]
    pub payload_cid: ContentId,
    pub actor: String,
    pub node_id: NodeId,
    pub timestamp: DateTime<Utc>,
    pub vector_clock: VectorClock,
    pub signature: Signature,
    pub record_hash: Digest,
}

impl ExecutionRecord {
    /// Attach a signature to content, computing the record hash.
    pub fn seal(content: RecordContent, signature: Signature) -> Self {
        let record_hash = content.digest();
        Self {
            exec_id: content.exec_id,
            step_id: content.step_id,
            prev_hash: content.prev_hash,
            payload_cid: content.payload_cid,
            actor: content.actor,
            node_id: content.node_id,
            timestamp: content.timestamp,
            vector_clock: content.vector_clock,
            signature,
            record_hash,
        }
    }

    /// Recompute the hash from the stored fields.
    pub fn compute_hash(&self) -> Digest {
        hash_fields(
            &self.exec_id,
            &self.step_id,
            &self.prev_hash,
            &self.payload_cid,
            &self.actor,
            &self.node_id,
            &self.timestamp,
            &self.vector_clock,
        )
    }

    pub fn verify_hash(&self) -> bool {
        self.compute_hash() == self.record_hash
    }

    /// Bytes handed to the signer: `recordHash ‖ actor ‖ nodeId`.
    pub fn signing_message(record_hash: &Digest, actor: &str, node_id: &NodeId) -> Vec<u8> {
        let mut message = Vec::with_capacity(64 + actor.len() + node_id.as_str().len() + 2);
        message.extend_from_slice(record_hash.to_hex().as_bytes());
        message.push(0x1f);
        message.extend_from_slice(actor.as_bytes());
        message.push(0x1f);
        message.extend_from_slice(node_id.as_str().as_bytes());
        message
    }

    pub fn own_signing_message(&self) -> Vec<u8> {
        Self::signing_message(&self.record_hash, &self.actor, &self.node_id)
    }
}

/// A record with its position in the execution's chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub record: ExecutionRecord,
    pub index: u64,
    /// Set when the record was signed and linked by this ledger at append time.
    pub verified: bool,
    pub timestamp: DateTime<Utc>,
}

#[allow(clippy::too_many_arguments)]
fn hash_fields(
    exec_id: &ExecutionId,
    step_id: &StepId,
    prev_hash: &Digest,
    payload_cid: &ContentId,
    actor: &str,
    node_id: &NodeId,
    timestamp: &DateTime<Utc>,
    vector_clock: &VectorClock,
) -> Digest {
    let prev_hex = prev_hash.to_hex();
    let timestamp = timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true);
    let clock = vector_clock.canonical_string();
    Digest::of_fields(
        RECORD_DOMAIN,
        &[
            exec_id.as_str().as_bytes(),
            step_id.as_str().as_bytes(),
            prev_hex.as_bytes(),
            payload_cid.as_str().as_bytes(),
            actor.as_bytes(),
            node_id.as_str().as_bytes(),
            timestamp.as_bytes(),
            clock.as_bytes(),
        ],
    )
}
