use std::collections::{BTreeMap, BTreeSet};

use flowsync_types::{Digest, OperationId};

use crate::operation::{tie_break, CrdtOperation};

const CONFLICT_DOMAIN: &str = "flowsync-conflict-v1:";

/// A connected set of mutually conflicting operations on one path.
#[derive(Clone, Debug, PartialEq)]
pub struct ConflictGroup {
    pub conflict_id: Digest,
    pub path: String,
    /// Indices into the operation slice, in tie-break order.
    pub members: Vec<usize>,
    /// Members not causally followed by another member, in tie-break order.
    pub frontier: Vec<usize>,
}

impl ConflictGroup {
    /// The operation whose position carries the group's resolved effect.
    pub fn winner(&self) -> usize {
        self.frontier[0]
    }

    /// Whether member `i` lies in the winner's causal past. Those members
    /// apply normally ahead of the resolution.
    pub fn precedes_winner(&self, i: usize, ops: &[CrdtOperation]) -> bool {
        ops[i]
            .vector_clock
            .happened_before(&ops[self.winner()].vector_clock)
    }

    /// Members the resolution decides between, in tie-break order: every
    /// member outside the winner's causal past, the winner included.
    pub fn contenders(&self, ops: &[CrdtOperation]) -> Vec<usize> {
        self.members
            .iter()
            .copied()
            .filter(|&m| !self.precedes_winner(m, ops))
            .collect()
    }

    pub fn operation_ids(&self, ops: &[CrdtOperation]) -> Vec<OperationId> {
        let mut ids: Vec<OperationId> = self
            .members
            .iter()
            .map(|&i| ops[i].operation_id.clone())
            .collect();
        ids.sort();
        ids
    }
}

/// Identifier shared by every replica holding the same conflicting operations.
pub fn conflict_id(operation_ids: &[OperationId]) -> Digest {
    let mut sorted: Vec<&OperationId> = operation_ids.iter().collect();
    sorted.sort();
    let fields: Vec<&[u8]> = sorted.iter().map(|id| id.as_str().as_bytes()).collect();
    Digest::of_fields(CONFLICT_DOMAIN, &fields)
}

/// Two operations conflict when they target the same path, their clocks are
/// concurrent and their kinds do not commute.
pub fn conflicts(a: &CrdtOperation, b: &CrdtOperation, set_paths: &BTreeSet<String>) -> bool {
    a.path == b.path
        && a.vector_clock.is_concurrent_with(&b.vector_clock)
        && !a.kind.commutes_with(&b.kind, set_paths.contains(&a.path))
}

/// Group conflicting operations into connected components per path.
///
/// Groups come back sorted by path, then by conflict id.
pub fn detect_conflicts(ops: &[CrdtOperation], set_paths: &BTreeSet<String>) -> Vec<ConflictGroup> {
    let mut by_path: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, op) in ops.iter().enumerate() {
        by_path.entry(op.path.as_str()).or_default().push(i);
    }

    let mut parent: Vec<usize> = (0..ops.len()).collect();
    for indices in by_path.values() {
        for (k, &a) in indices.iter().enumerate() {
            for &b in &indices[k + 1..] {
                if conflicts(&ops[a], &ops[b], set_paths) {
                    union(&mut parent, a, b);
                }
            }
        }
    }

    let mut components: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for i in 0..ops.len() {
        let root = find(&mut parent, i);
        components.entry(root).or_default().push(i);
    }

    let mut groups: Vec<ConflictGroup> = components
        .into_values()
        .filter(|members| members.len() > 1)
        .map(|mut members| {
            members.sort_by(|&a, &b| tie_break(&ops[a], &ops[b]));
            let frontier: Vec<usize> = members
                .iter()
                .copied()
                .filter(|&m| {
                    !members.iter().any(|&other| {
                        other != m && ops[m].vector_clock.happened_before(&ops[other].vector_clock)
                    })
                })
                .collect();
            let ids: Vec<OperationId> = members.iter().map(|&i| ops[i].operation_id.clone()).collect();
            ConflictGroup {
                conflict_id: conflict_id(&ids),
                path: ops[members[0]].path.clone(),
                members,
                frontier,
            }
        })
        .collect();
    groups.sort_by(|a, b| a.path.cmp(&b.path).then(a.conflict_id.cmp(&b.conflict_id)));
    groups
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

fn union(parent: &mut [usize], a: usize, b: usize) {
    let ra = find(parent, a);
    let rb = find(parent, b);
    if ra != rb {
        parent[ra.max(rb)] = ra.min(rb);
    }
}
