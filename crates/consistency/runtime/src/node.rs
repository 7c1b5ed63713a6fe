use std::sync::Arc;

use flowsync_adapters::{ContentStore, FileContentStore, InMemoryContentStore};
use flowsync_crdt::{ConflictPolicy, CrdtStateManager};
use flowsync_events::EventBus;
use flowsync_ledger::ExecutionLedger;
use tracing::info;

use crate::config::ConsistencyConfig;
use crate::error::CoreResult;

/// The ledger and the CRDT state manager of one node, sharing an event bus
/// and a content store.
pub struct ConsistencyCore {
    config: ConsistencyConfig,
    bus: Arc<EventBus>,
    store: Arc<dyn ContentStore>,
    public_key: String,
    ledger: ExecutionLedger,
    crdt: CrdtStateManager,
}

impl ConsistencyCore {
    /// Build and initialize both components from `config`.
    pub async fn from_config(config: ConsistencyConfig) -> CoreResult<Self> {
        config.validate()?;

        let bus = Arc::new(EventBus::with_capacity(config.event_channel_capacity));
        let store: Arc<dyn ContentStore> = match &config.store_dir {
            Some(dir) => Arc::new(FileContentStore::open(dir.clone()).await?),
            None => Arc::new(InMemoryContentStore::new()),
        };
        let signer = config.signer()?;
        let public_key = signer.public_key_hex();

        let ledger = ExecutionLedger::in_memory(
            config.ledger_config(),
            Arc::new(signer),
            store.clone(),
            bus.clone(),
        );
        ledger.initialize().await?;
        let crdt = CrdtStateManager::in_memory(config.crdt_config(), store.clone(), bus.clone());

        info!(
            node_id = %config.node_id,
            file_store = config.store_dir.is_some(),
            strategy = %config.crdt.strategy,
            "Consistency core ready"
        );
        Ok(Self {
            config,
            bus,
            store,
            public_key,
            ledger,
            crdt,
        })
    }

    /// Install the policy used by the custom resolution strategy.
    pub fn with_conflict_policy(mut self, policy: Arc<dyn ConflictPolicy>) -> Self {
        self.crdt = self.crdt.with_policy(policy);
        self
    }

    pub fn config(&self) -> &ConsistencyConfig {
        &self.config
    }

    pub fn ledger(&self) -> &ExecutionLedger {
        &self.ledger
    }

    pub fn crdt(&self) -> &CrdtStateManager {
        &self.crdt
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    /// Hex-encoded verifying key of this node's ledger signer.
    pub fn public_key_hex(&self) -> &str {
        &self.public_key
    }
}
