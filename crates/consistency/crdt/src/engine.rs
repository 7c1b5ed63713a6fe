use std::collections::{BTreeSet, HashMap};

use flowsync_types::{Digest, OperationId, VectorClock};
use serde_json::{Map, Value};
use tracing::warn;

use crate::conflict::{detect_conflicts, ConflictGroup};
use crate::document;
use crate::operation::CrdtOperation;
use crate::order::causal_order;
use crate::resolution::{resolve_effects, ConflictPolicy, ResolutionStrategy};

/// A conflict group and the value its resolution left at the path.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedGroup {
    pub conflict_id: Digest,
    pub path: String,
    pub operation_ids: Vec<OperationId>,
    pub resolved_value: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FoldOutcome {
    pub state: Value,
    pub resolved: Vec<ResolvedGroup>,
}

/// Pure state computation: the same base and operation set always fold to
/// the same document, whatever order the operations arrived in.
pub struct Engine<'a> {
    pub set_paths: &'a BTreeSet<String>,
    pub strategy: ResolutionStrategy,
    pub policy: Option<&'a dyn ConflictPolicy>,
}

impl<'a> Engine<'a> {
    /// Fold `ops` onto `base` in causal order.
    ///
    /// Each conflict group contributes its resolved effect at its winner's
    /// position. Members in the winner's causal past apply normally; the
    /// concurrent branches that lost are suppressed. Malformed operations
    /// are skipped.
    pub fn fold(&self, base: &Value, ops: &[CrdtOperation]) -> FoldOutcome {
        let ops: Vec<CrdtOperation> = ops
            .iter()
            .filter(|op| match op.validate() {
                Ok(()) => true,
                Err(e) => {
                    warn!(operation_id = %op.operation_id, error = %e, "Skipping malformed operation");
                    false
                }
            })
            .cloned()
            .collect();

        let order = causal_order(&ops);
        let groups = detect_conflicts(&ops, self.set_paths);
        let mut group_of: HashMap<usize, usize> = HashMap::new();
        for (g, group) in groups.iter().enumerate() {
            for &member in &group.members {
                group_of.insert(member, g);
            }
        }

        let mut state = match base {
            Value::Object(_) => base.clone(),
            _ => Value::Object(Map::new()),
        };
        let mut resolved = Vec::with_capacity(groups.len());

        for &i in &order {
            let op = &ops[i];
            match group_of.get(&i) {
                Some(&g) if groups[g].winner() == i => {
                    let group = &groups[g];
                    let value = self.apply_group(&mut state, group, &ops);
                    resolved.push(ResolvedGroup {
                        conflict_id: group.conflict_id,
                        path: group.path.clone(),
                        operation_ids: group.operation_ids(&ops),
                        resolved_value: value,
                    });
                }
                Some(&g) if groups[g].precedes_winner(i, &ops) => {
                    self.apply_one(&mut state, op);
                }
                Some(_) => {}
                None => self.apply_one(&mut state, op),
            }
        }

        FoldOutcome { state, resolved }
    }

    fn apply_one(&self, state: &mut Value, op: &CrdtOperation) {
        let set_semantics = self.set_paths.contains(&op.path);
        if let Err(e) = document::apply(state, &op.path, &op.kind, set_semantics) {
            warn!(operation_id = %op.operation_id, error = %e, "Skipping operation");
        }
    }

    fn apply_group(&self, state: &mut Value, group: &ConflictGroup, ops: &[CrdtOperation]) -> Value {
        let members: Vec<&CrdtOperation> = group
            .contenders(ops)
            .into_iter()
            .map(|m| &ops[m])
            .collect();
        let frontier: Vec<&CrdtOperation> = group.frontier.iter().map(|&m| &ops[m]).collect();
        let effects = resolve_effects(
            self.strategy,
            self.policy,
            &group.path,
            document::get(state, &group.path),
            &members,
            &frontier,
        );

        let set_semantics = self.set_paths.contains(&group.path);
        for effect in &effects {
            if let Err(e) = document::apply(state, &group.path, effect, set_semantics) {
                warn!(
                    conflict_id = ?group.conflict_id,
                    path = %group.path,
                    error = %e,
                    "Resolved effect could not be applied"
                );
            }
        }
        document::get(state, &group.path)
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Indices of the operations a compaction at `cutoff` folds, in causal
    /// order: the longest causal-order prefix whose clocks are covered by
    /// `cutoff`, shortened until no conflict group straddles its end.
    pub fn compaction_prefix(&self, ops: &[CrdtOperation], cutoff: &VectorClock) -> Vec<usize> {
        let order = causal_order(ops);
        let groups = detect_conflicts(ops, self.set_paths);

        let mut position = vec![0usize; ops.len()];
        for (pos, &i) in order.iter().enumerate() {
            position[i] = pos;
        }

        let mut end = order
            .iter()
            .take_while(|&&i| ops[i].vector_clock.is_covered_by(cutoff))
            .count();
        loop {
            let mut shrunk = false;
            for group in &groups {
                let first = group.members.iter().map(|&m| position[m]).min().unwrap_or(0);
                let last = group.members.iter().map(|&m| position[m]).max().unwrap_or(0);
                if first < end && last >= end {
                    end = first;
                    shrunk = true;
                }
            }
            if !shrunk {
                break;
            }
        }
        order[..end].to_vec()
    }
}
