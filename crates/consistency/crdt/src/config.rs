use std::time::Duration;

use flowsync_types::NodeId;

use crate::resolution::ResolutionStrategy;

/// Configuration for the CRDT state manager.
#[derive(Clone, Debug)]
pub struct CrdtConfig {
    /// Node identifier stamped on local operations
    pub node_id: NodeId,
    /// Resolution applied to every conflict group
    pub strategy: ResolutionStrategy,
    /// Paths whose appends are set unions
    pub set_paths: Vec<String>,
    /// Compact after a mutation leaves more operations than this
    pub auto_compact_threshold: Option<usize>,
    /// Deadline for each content store call
    pub adapter_timeout: Duration,
}

impl Default for CrdtConfig {
    fn default() -> Self {
        Self {
            node_id: NodeId::from("node-1"),
            strategy: ResolutionStrategy::LastWriteWins,
            set_paths: Vec::new(),
            auto_compact_threshold: None,
            adapter_timeout: Duration::from_secs(5),
        }
    }
}
