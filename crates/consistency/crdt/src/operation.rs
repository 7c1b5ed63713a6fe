use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use flowsync_types::{NodeId, OperationId, VectorClock};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CrdtError;

/// What an operation does to the value at its path.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum OperationKind {
    Set(Value),
    Delete,
    Increment(f64),
    Decrement(f64),
    Append(Value),
    Merge(Map<String, Value>),
}

impl OperationKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Set(_) => "set",
            Self::Delete => "delete",
            Self::Increment(_) => "increment",
            Self::Decrement(_) => "decrement",
            Self::Append(_) => "append",
            Self::Merge(_) => "merge",
        }
    }

    /// Signed numeric delta of an increment or decrement.
    pub fn delta(&self) -> Option<f64> {
        match self {
            Self::Increment(d) => Some(*d),
            Self::Decrement(d) => Some(-*d),
            _ => None,
        }
    }

    pub fn is_write(&self) -> bool {
        matches!(self, Self::Set(_) | Self::Delete)
    }

    /// Whether applying `self` and `other` to the same path gives the same
    /// result in either order.
    pub fn commutes_with(&self, other: &OperationKind, set_path: bool) -> bool {
        match (self, other) {
            (Self::Increment(_) | Self::Decrement(_), Self::Increment(_) | Self::Decrement(_)) => {
                true
            }
            (Self::Append(_), Self::Append(_)) => set_path,
            (Self::Merge(a), Self::Merge(b)) => a.keys().all(|k| !b.contains_key(k)),
            _ => false,
        }
    }
}

/// Reject paths that cannot address a document location.
pub fn validate_path(path: &str) -> Result<(), CrdtError> {
    if path.is_empty() {
        return Err(CrdtError::MalformedOperation("empty path".into()));
    }
    if path.split('.').any(str::is_empty) {
        return Err(CrdtError::MalformedOperation(format!(
            "path '{}' has an empty segment",
            path
        )));
    }
    Ok(())
}

/// One state mutation. Immutable once created.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrdtOperation {
    pub operation_id: OperationId,
    #[serde(flatten)]
    pub kind: OperationKind,
    pub path: String,
    pub timestamp: DateTime<Utc>,
    pub node_id: NodeId,
    pub vector_clock: VectorClock,
    /// Operations this one causally depends on.
    #[serde(default)]
    pub causality: Vec<OperationId>,
}

impl CrdtOperation {
    /// Structural checks that do not depend on the document.
    pub fn validate(&self) -> Result<(), CrdtError> {
        validate_path(&self.path)?;
        if let Some(delta) = self.kind.delta() {
            if !delta.is_finite() {
                return Err(CrdtError::MalformedOperation(format!(
                    "operation {} has non-finite delta",
                    self.operation_id
                )));
            }
        }
        if self.vector_clock.is_empty() {
            return Err(CrdtError::MalformedOperation(format!(
                "operation {} has an empty vector clock",
                self.operation_id
            )));
        }
        Ok(())
    }
}

/// Deterministic order for concurrent operations: later timestamp first,
/// then ascending node id, then ascending operation id.
pub fn tie_break(a: &CrdtOperation, b: &CrdtOperation) -> Ordering {
    b.timestamp
        .cmp(&a.timestamp)
        .then_with(|| a.node_id.cmp(&b.node_id))
        .then_with(|| a.operation_id.cmp(&b.operation_id))
}

/// A local mutation, before it is stamped by the manager.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRequest {
    #[serde(flatten)]
    pub kind: OperationKind,
    pub path: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl OperationRequest {
    pub fn new(kind: OperationKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
            timestamp: None,
        }
    }

    pub fn set(path: impl Into<String>, value: Value) -> Self {
        Self::new(OperationKind::Set(value), path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(OperationKind::Delete, path)
    }

    pub fn increment(path: impl Into<String>, delta: f64) -> Self {
        Self::new(OperationKind::Increment(delta), path)
    }

    pub fn decrement(path: impl Into<String>, delta: f64) -> Self {
        Self::new(OperationKind::Decrement(delta), path)
    }

    pub fn append(path: impl Into<String>, value: Value) -> Self {
        Self::new(OperationKind::Append(value), path)
    }

    pub fn merge(path: impl Into<String>, entries: Map<String, Value>) -> Self {
        Self::new(OperationKind::Merge(entries), path)
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}
