use std::time::Duration;

use flowsync_types::NodeId;

/// Configuration for the execution ledger.
#[derive(Clone, Debug)]
pub struct LedgerConfig {
    /// Node identifier for this instance
    pub node_id: NodeId,
    /// Deadline for each signer / store call
    pub adapter_timeout: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            node_id: NodeId::from("node-1"),
            adapter_timeout: Duration::from_secs(5),
        }
    }
}
