use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::NodeId;

/// Outcome of comparing two vector clocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CausalOrder {
    /// Left happened-before right.
    Before,
    /// Right happened-before left.
    After,
    Equal,
    /// Neither dominates the other.
    Concurrent,
}

/// Vector clock: per-node logical counters.
///
/// Missing entries read as zero. A node only ever increments its own
/// counter; remote knowledge arrives through [`VectorClock::merge`].
/// Entries are kept in a `BTreeMap` so the serialized form is canonical.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorClock(BTreeMap<NodeId, u64>);

impl VectorClock {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn get(&self, node: &NodeId) -> u64 {
        self.0.get(node).copied().unwrap_or(0)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&NodeId, &u64)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Register `node` with a zero counter if it has no entry yet.
    pub fn ensure(&mut self, node: &NodeId) {
        self.0.entry(node.clone()).or_insert(0);
    }

    /// Advance `node`'s counter and return the new value.
    pub fn increment(&mut self, node: &NodeId) -> u64 {
        let counter = self.0.entry(node.clone()).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Pointwise max.
    pub fn merge(&mut self, other: &VectorClock) {
        for (node, &counter) in &other.0 {
            let entry = self.0.entry(node.clone()).or_insert(0);
            if counter > *entry {
                *entry = counter;
            }
        }
    }

    pub fn merged(&self, other: &VectorClock) -> VectorClock {
        let mut out = self.clone();
        out.merge(other);
        out
    }

    /// Pointwise min. Zero entries are dropped.
    pub fn meet(&self, other: &VectorClock) -> VectorClock {
        self.0
            .iter()
            .map(|(node, &counter)| (node.clone(), counter.min(other.get(node))))
            .filter(|&(_, counter)| counter > 0)
            .collect()
    }

    pub fn compare(&self, other: &VectorClock) -> CausalOrder {
        let mut less = false;
        let mut greater = false;
        for node in self.0.keys().chain(other.0.keys()) {
            let (a, b) = (self.get(node), other.get(node));
            if a < b {
                less = true;
            } else if a > b {
                greater = true;
            }
            if less && greater {
                return CausalOrder::Concurrent;
            }
        }
        match (less, greater) {
            (false, false) => CausalOrder::Equal,
            (true, false) => CausalOrder::Before,
            (false, true) => CausalOrder::After,
            (true, true) => CausalOrder::Concurrent,
        }
    }

    pub fn happened_before(&self, other: &VectorClock) -> bool {
        self.compare(other) == CausalOrder::Before
    }

    pub fn is_concurrent_with(&self, other: &VectorClock) -> bool {
        self.compare(other) == CausalOrder::Concurrent
    }

    /// `self <= other` pointwise: every event `self` has seen, `other` has seen.
    pub fn is_covered_by(&self, other: &VectorClock) -> bool {
        self.0.iter().all(|(node, &counter)| counter <= other.get(node))
    }

    /// Canonical compact JSON (`{"n1":2,"n2":1}`), used as hash input.
    pub fn canonical_string(&self) -> String {
        let mut out = String::from("{");
        for (i, (node, counter)) in self.0.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(&serde_json::Value::String(node.0.clone()).to_string());
            out.push(':');
            out.push_str(&counter.to_string());
        }
        out.push('}');
        out
    }
}

impl FromIterator<(NodeId, u64)> for VectorClock {
    fn from_iter<I: IntoIterator<Item = (NodeId, u64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for VectorClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (node, counter)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}:{}", node, counter)?;
        }
        write!(f, "}}")
    }
}
