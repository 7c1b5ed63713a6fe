use std::time::Duration;

use flowsync_adapters::{with_timeout, Signer};
use flowsync_types::{CausalOrder, ExecutionId, GENESIS_HASH};
use serde::{Deserialize, Serialize};

use crate::record::LedgerEntry;

/// Outcome of validating one execution's chain.
///
/// `is_valid` is `chain_integrity && signature_validity`; causal anomalies
/// only produce warnings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerValidation {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub chain_integrity: bool,
    pub signature_validity: bool,
    pub causal_consistency: bool,
    pub record_count: usize,
}

impl LedgerValidation {
    fn empty() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            chain_integrity: true,
            signature_validity: true,
            causal_consistency: true,
            record_count: 0,
        }
    }

    /// Result for a ledger that cannot be read at all.
    pub(crate) fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            errors: vec![reason.into()],
            chain_integrity: false,
            signature_validity: false,
            causal_consistency: false,
            ..Self::empty()
        }
    }
}

/// Validates an execution's entries.
///
/// Checks, per entry:
/// - recomputed hash equals the stored `recordHash`
/// - `prevHash` links to the previous entry, or genesis for the first
/// - the stored index matches the position
/// - the signature verifies over `recordHash ‖ actor ‖ nodeId`
/// - no later vector clock precedes or equals an earlier one
pub struct ChainValidator;

impl ChainValidator {
    pub async fn validate(
        exec_id: &ExecutionId,
        entries: &[LedgerEntry],
        signer: &dyn Signer,
        timeout: Duration,
    ) -> LedgerValidation {
        let mut result = LedgerValidation::empty();
        result.record_count = entries.len();

        if entries.is_empty() {
            result
                .warnings
                .push(format!("ledger for execution {} is empty", exec_id));
            return result;
        }

        for (i, entry) in entries.iter().enumerate() {
            let record = &entry.record;

            if record.exec_id != *exec_id {
                result.chain_integrity = false;
                result.errors.push(format!(
                    "record {}: belongs to execution {}, not {}",
                    i, record.exec_id, exec_id
                ));
            }

            if entry.index != i as u64 {
                result.chain_integrity = false;
                result
                    .errors
                    .push(format!("record {}: stored index is {}", i, entry.index));
            }

            if !record.verify_hash() {
                result.chain_integrity = false;
                result.errors.push(format!(
                    "record {} ({}): hash mismatch, stored {} computed {}",
                    i,
                    record.step_id,
                    record.record_hash,
                    record.compute_hash()
                ));
            }

            let expected_prev = if i == 0 {
                GENESIS_HASH
            } else {
                entries[i - 1].record.record_hash
            };
            if record.prev_hash != expected_prev {
                result.chain_integrity = false;
                if i == 0 {
                    result
                        .errors
                        .push("record 0: prevHash is not the genesis hash".to_string());
                } else {
                    result.errors.push(format!(
                        "record {}: prevHash does not link to record {}",
                        i,
                        i - 1
                    ));
                }
            }

            let message = record.own_signing_message();
            match with_timeout(timeout, "signer.verify", signer.verify(&message, &record.signature))
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    result.signature_validity = false;
                    result
                        .errors
                        .push(format!("record {} ({}): invalid signature", i, record.step_id));
                }
                Err(e) => {
                    result.signature_validity = false;
                    result.errors.push(format!(
                        "record {} ({}): signature check failed: {}",
                        i, record.step_id, e
                    ));
                }
            }

            for (j, earlier) in entries[..i].iter().enumerate() {
                match record.vector_clock.compare(&earlier.record.vector_clock) {
                    CausalOrder::Before => {
                        result.causal_consistency = false;
                        result.warnings.push(format!(
                            "record {} causally precedes earlier record {}",
                            i, j
                        ));
                    }
                    CausalOrder::Equal => {
                        result.causal_consistency = false;
                        result.warnings.push(format!(
                            "record {} has the same vector clock as record {}",
                            i, j
                        ));
                    }
                    CausalOrder::After | CausalOrder::Concurrent => {}
                }
            }
        }

        result.is_valid = result.chain_integrity && result.signature_validity;
        result
    }
}
