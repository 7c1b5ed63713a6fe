use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use tracing::warn;

use crate::operation::{tie_break, CrdtOperation};

/// Ready-set entry ordered by the tie-break rule.
struct Ready<'a> {
    op: &'a CrdtOperation,
    index: usize,
}

impl PartialEq for Ready<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ready<'_> {}

impl PartialOrd for Ready<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ready<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        tie_break(self.op, other.op).then_with(|| self.index.cmp(&other.index))
    }
}

/// Topological order of `ops` (as indices).
///
/// Edges come from `causality` links to operations present in `ops` and
/// from strict vector-clock precedence. Among ready operations the
/// tie-break rule picks. The result depends only on the operation set, not
/// on the order of `ops`.
pub fn causal_order(ops: &[CrdtOperation]) -> Vec<usize> {
    let n = ops.len();
    let by_id: HashMap<&str, usize> = ops
        .iter()
        .enumerate()
        .map(|(i, op)| (op.operation_id.as_str(), i))
        .collect();

    let mut successors: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
    for (j, op) in ops.iter().enumerate() {
        for dep in &op.causality {
            if let Some(&i) = by_id.get(dep.as_str()) {
                if i != j {
                    successors[i].insert(j);
                }
            }
        }
    }
    for i in 0..n {
        for j in 0..n {
            if i != j && ops[i].vector_clock.happened_before(&ops[j].vector_clock) {
                successors[i].insert(j);
            }
        }
    }

    let mut in_degree = vec![0usize; n];
    for targets in &successors {
        for &j in targets {
            in_degree[j] += 1;
        }
    }

    let mut ready: BTreeSet<Ready<'_>> = (0..n)
        .filter(|&i| in_degree[i] == 0)
        .map(|index| Ready {
            op: &ops[index],
            index,
        })
        .collect();
    let mut order = Vec::with_capacity(n);
    let mut placed = vec![false; n];

    while let Some(next) = ready.pop_first() {
        order.push(next.index);
        placed[next.index] = true;
        for &j in &successors[next.index] {
            in_degree[j] -= 1;
            if in_degree[j] == 0 {
                ready.insert(Ready { op: &ops[j], index: j });
            }
        }
    }

    if order.len() < n {
        let mut rest: Vec<Ready<'_>> = (0..n)
            .filter(|&i| !placed[i])
            .map(|index| Ready {
                op: &ops[index],
                index,
            })
            .collect();
        warn!(
            remaining = rest.len(),
            "Causality cycle among operations, ordering remainder by tie-break"
        );
        rest.sort();
        order.extend(rest.into_iter().map(|r| r.index));
    }
    order
}
