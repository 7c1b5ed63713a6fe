use std::fmt;

use chrono::{DateTime, Utc};
use flowsync_types::{Digest, NodeId, OperationId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::document;
use crate::operation::{CrdtOperation, OperationKind};

/// How a conflict group collapses into one effect.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionStrategy {
    /// The tie-break winner's effect stands.
    #[default]
    LastWriteWins,
    /// Numeric deltas sum, list appends concatenate, maps combine.
    Merge,
    /// Delegated to an installed [`ConflictPolicy`].
    Custom,
}

impl ResolutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LastWriteWins => "last-write-wins",
            Self::Merge => "merge",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Externally supplied resolution for [`ResolutionStrategy::Custom`].
///
/// Must be a pure function of its inputs or replicas diverge.
pub trait ConflictPolicy: Send + Sync {
    /// Value to write at `path`, or `None` to fall back to last-write-wins.
    ///
    /// `operations` are the contending operations in tie-break order (the
    /// winner's causal past has already been applied) and `current` is the
    /// value at `path` just before the winner's position.
    fn resolve(
        &self,
        path: &str,
        current: Option<&Value>,
        operations: &[&CrdtOperation],
    ) -> Option<Value>;
}

/// Record of one resolved conflict group.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictResolution {
    pub conflict_id: Digest,
    pub operation_ids: Vec<OperationId>,
    pub path: String,
    pub resolution_strategy: ResolutionStrategy,
    pub resolved_value: Value,
    pub resolved_at: DateTime<Utc>,
    pub resolved_by: NodeId,
}

/// The sequence of effects that replaces a conflict group.
///
/// `members` are the group's contenders (everything outside the winner's
/// causal past) in tie-break order; `frontier` holds the members no other
/// member causally follows, also in tie-break order, and is never empty.
pub(crate) fn resolve_effects(
    strategy: ResolutionStrategy,
    policy: Option<&dyn ConflictPolicy>,
    path: &str,
    current: Option<&Value>,
    members: &[&CrdtOperation],
    frontier: &[&CrdtOperation],
) -> Vec<OperationKind> {
    match strategy {
        ResolutionStrategy::LastWriteWins => last_write_wins(frontier),
        ResolutionStrategy::Merge => merge(members, frontier),
        ResolutionStrategy::Custom => match policy.and_then(|p| p.resolve(path, current, members)) {
            Some(value) => vec![OperationKind::Set(value)],
            None => last_write_wins(frontier),
        },
    }
}

fn last_write_wins(frontier: &[&CrdtOperation]) -> Vec<OperationKind> {
    frontier
        .first()
        .map(|winner| vec![winner.kind.clone()])
        .unwrap_or_default()
}

fn merge(members: &[&CrdtOperation], frontier: &[&CrdtOperation]) -> Vec<OperationKind> {
    let base: Option<&CrdtOperation> = frontier.iter().find(|op| op.kind.is_write()).copied();
    let contributes = |op: &&&CrdtOperation| match base {
        Some(write) => op.vector_clock.is_concurrent_with(&write.vector_clock),
        None => true,
    };

    let contributing: Vec<&CrdtOperation> = members.iter().filter(contributes).copied().collect();
    let deltas: Vec<f64> = contributing.iter().filter_map(|op| op.kind.delta()).collect();
    let total: f64 = deltas.iter().sum();

    let mut appended: Vec<Value> = Vec::new();
    for op in &contributing {
        if let OperationKind::Append(value) = &op.kind {
            if !appended.contains(value) {
                appended.push(value.clone());
            }
        }
    }

    // Earlier in tie-break order wins a key.
    let mut combined = Map::new();
    let mut has_merge = false;
    for op in &contributing {
        if let OperationKind::Merge(entries) = &op.kind {
            has_merge = true;
            for (k, v) in entries {
                if !combined.contains_key(k) {
                    combined.insert(k.clone(), v.clone());
                }
            }
        }
    }

    match base.map(|op| &op.kind) {
        Some(OperationKind::Set(Value::Number(n))) if !deltas.is_empty() => {
            let summed = n
                .as_f64()
                .and_then(|n| document::number(n + total))
                .unwrap_or(Value::Number(n.clone()));
            vec![OperationKind::Set(summed)]
        }
        Some(OperationKind::Set(Value::Array(items))) if !appended.is_empty() => {
            let mut items = items.clone();
            for value in appended {
                if !items.contains(&value) {
                    items.push(value);
                }
            }
            vec![OperationKind::Set(Value::Array(items))]
        }
        Some(OperationKind::Set(Value::Object(entries))) if has_merge => {
            let mut entries = entries.clone();
            for (k, v) in combined {
                entries.entry(k).or_insert(v);
            }
            vec![OperationKind::Set(Value::Object(entries))]
        }
        Some(kind) => vec![kind.clone()],
        None => {
            let mut effects = Vec::new();
            if !deltas.is_empty() {
                effects.push(OperationKind::Increment(total));
            }
            effects.extend(appended.into_iter().map(OperationKind::Append));
            if has_merge {
                effects.push(OperationKind::Merge(combined));
            }
            effects
        }
    }
}
