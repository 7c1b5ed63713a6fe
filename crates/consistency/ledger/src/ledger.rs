use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use flowsync_adapters::{with_timeout, ContentStore, Signer};
use flowsync_events::{ConsistencyEvent, EventBus};
use flowsync_types::{ContentId, ExecutionId, NodeId, PartitionLocks, VectorClock, GENESIS_HASH};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::record::{AppendRequest, ExecutionRecord, LedgerEntry, RecordContent};
use crate::replay::{ReplayCursor, ReplayState, ReplaySummary};
use crate::repository::{InMemoryLedgerRepository, LedgerRepository};
use crate::snapshot::{LedgerSnapshot, SNAPSHOT_VERSION};
use crate::validation::{ChainValidator, LedgerValidation};

/// The Execution Ledger: append-only, hash-chained, signed step records
/// partitioned by execution.
///
/// Writers of one execution are serialized through [`PartitionLocks`]; an
/// active replay blocks appends and imports for its execution.
pub struct ExecutionLedger {
    config: LedgerConfig,
    signer: Arc<dyn Signer>,
    store: Arc<dyn ContentStore>,
    repository: Arc<dyn LedgerRepository>,
    bus: Arc<EventBus>,
    initialized: AtomicBool,
    clock: RwLock<VectorClock>,
    replays: RwLock<HashMap<ExecutionId, ReplayCursor>>,
    locks: PartitionLocks<ExecutionId>,
}

impl ExecutionLedger {
    pub fn new(
        config: LedgerConfig,
        signer: Arc<dyn Signer>,
        store: Arc<dyn ContentStore>,
        repository: Arc<dyn LedgerRepository>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            config,
            signer,
            store,
            repository,
            bus,
            initialized: AtomicBool::new(false),
            clock: RwLock::new(VectorClock::new()),
            replays: RwLock::new(HashMap::new()),
            locks: PartitionLocks::new(),
        }
    }

    /// Ledger backed by an [`InMemoryLedgerRepository`].
    pub fn in_memory(
        config: LedgerConfig,
        signer: Arc<dyn Signer>,
        store: Arc<dyn ContentStore>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self::new(
            config,
            signer,
            store,
            Arc::new(InMemoryLedgerRepository::new()),
            bus,
        )
    }

    pub fn node_id(&self) -> &NodeId {
        &self.config.node_id
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Ready the ledger. Idempotent; only the first call publishes
    /// `ledger.initialized`.
    pub async fn initialize(&self) -> Result<(), LedgerError> {
        self.clock.write().await.ensure(&self.config.node_id);
        if self.initialized.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        info!(node_id = %self.config.node_id, "Execution ledger initialized");
        self.bus
            .publish(ConsistencyEvent::LedgerInitialized {
                node_id: self.config.node_id.clone(),
                timestamp: Utc::now(),
            })
            .await;
        Ok(())
    }

    fn ensure_initialized(&self) -> Result<(), LedgerError> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(LedgerError::NotInitialized)
        }
    }

    /// The node-wide vector clock.
    pub async fn vector_clock(&self) -> VectorClock {
        self.clock.read().await.clone()
    }

    /// Merge a remote clock into the ledger's clock.
    pub async fn observe_clock(&self, remote: &VectorClock) -> Result<(), LedgerError> {
        self.ensure_initialized()?;
        self.clock.write().await.merge(remote);
        Ok(())
    }

    /// Append a record to the end of an execution's chain.
    pub async fn append_record(
        &self,
        request: AppendRequest,
    ) -> Result<ExecutionRecord, LedgerError> {
        self.ensure_initialized()?;
        let exec_id = request.exec_id.clone();
        let _guard = self.locks.lock(&exec_id).await;

        if self.replays.read().await.contains_key(&exec_id) {
            return Err(LedgerError::ReplayInProgress(exec_id));
        }

        let last = self.repository.last_entry(&exec_id).await?;
        let (prev_hash, index) = match &last {
            Some(entry) => (entry.record.record_hash, entry.index + 1),
            None => (GENESIS_HASH, 0),
        };

        let node_id = request
            .node_id
            .unwrap_or_else(|| self.config.node_id.clone());
        // Held until the append lands; the clock only advances for records
        // that were stored.
        let mut clock = self.clock.write().await;
        let mut vector_clock = clock.clone();
        vector_clock.increment(&node_id);

        let content = RecordContent {
            exec_id: exec_id.clone(),
            step_id: request.step_id,
            prev_hash,
            payload_cid: request.payload_cid,
            actor: request.actor,
            node_id,
            timestamp: request.timestamp.unwrap_or_else(Utc::now),
            vector_clock,
        };
        let record_hash = content.digest();
        let message = ExecutionRecord::signing_message(&record_hash, &content.actor, &content.node_id);
        let signature = with_timeout(
            self.config.adapter_timeout,
            "signer.sign",
            self.signer.sign(&message),
        )
        .await?;
        let record = ExecutionRecord::seal(content, signature);

        self.repository
            .append(
                &exec_id,
                LedgerEntry {
                    record: record.clone(),
                    index,
                    verified: true,
                    timestamp: Utc::now(),
                },
            )
            .await?;
        clock.merge(&record.vector_clock);
        drop(clock);

        debug!(
            exec_id = %exec_id,
            step_id = %record.step_id,
            index,
            record_hash = ?record.record_hash,
            "Record appended"
        );
        self.bus
            .publish(ConsistencyEvent::RecordAppended {
                exec_id,
                step_id: record.step_id.clone(),
                record_hash: record.record_hash,
                index,
                node_id: record.node_id.clone(),
                timestamp: record.timestamp,
            })
            .await;

        Ok(record)
    }

    /// All entries of an execution in append order.
    pub async fn get_execution_records(
        &self,
        exec_id: &ExecutionId,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.ensure_initialized()?;
        self.repository.entries(exec_id).await
    }

    /// Check the chain of one execution. Never fails; problems are reported
    /// in the result.
    pub async fn validate_ledger(&self, exec_id: &ExecutionId) -> LedgerValidation {
        if !self.is_initialized() {
            return LedgerValidation::unavailable("ledger not initialized");
        }
        let entries = match self.repository.entries(exec_id).await {
            Ok(entries) => entries,
            Err(e) => return LedgerValidation::unavailable(format!("cannot read ledger: {}", e)),
        };
        let validation = ChainValidator::validate(
            exec_id,
            &entries,
            self.signer.as_ref(),
            self.config.adapter_timeout,
        )
        .await;

        for warning in &validation.warnings {
            warn!(exec_id = %exec_id, "{}", warning);
        }
        validation
    }

    /// Begin replaying an execution from its first record.
    pub async fn start_replay(&self, exec_id: &ExecutionId) -> Result<ReplayState, LedgerError> {
        self.ensure_initialized()?;
        let _guard = self.locks.lock(exec_id).await;

        if self.replays.read().await.contains_key(exec_id) {
            return Err(LedgerError::Replay(format!(
                "replay already active for execution {}",
                exec_id
            )));
        }

        let entries = self.repository.entries(exec_id).await?;
        if entries.is_empty() {
            return Err(LedgerError::Replay(format!(
                "no records for execution {}",
                exec_id
            )));
        }

        let validation = ChainValidator::validate(
            exec_id,
            &entries,
            self.signer.as_ref(),
            self.config.adapter_timeout,
        )
        .await;
        if !validation.is_valid {
            return Err(LedgerError::Replay(format!(
                "ledger for execution {} is invalid: {}",
                exec_id,
                validation.errors.join("; ")
            )));
        }

        let cursor = ReplayCursor::start(
            exec_id.clone(),
            entries.into_iter().map(|e| e.record).collect(),
        );
        let state = cursor.state().clone();
        let record_count = cursor.total() as u64;
        self.replays.write().await.insert(exec_id.clone(), cursor);

        info!(exec_id = %exec_id, record_count, "Replay started");
        self.bus
            .publish(ConsistencyEvent::ReplayStarted {
                exec_id: exec_id.clone(),
                record_count,
                timestamp: Utc::now(),
            })
            .await;
        Ok(state)
    }

    /// The next record of an active replay; `None` when exhausted or idle.
    pub async fn get_next_replay_record(
        &self,
        exec_id: &ExecutionId,
    ) -> Result<Option<ExecutionRecord>, LedgerError> {
        self.ensure_initialized()?;
        let mut replays = self.replays.write().await;
        Ok(replays.get_mut(exec_id).and_then(ReplayCursor::next_record))
    }

    pub async fn replay_state(
        &self,
        exec_id: &ExecutionId,
    ) -> Result<Option<ReplayState>, LedgerError> {
        self.ensure_initialized()?;
        Ok(self
            .replays
            .read()
            .await
            .get(exec_id)
            .map(|cursor| cursor.state().clone()))
    }

    /// End an active replay. No-op returning `None` when none is active.
    pub async fn complete_replay(
        &self,
        exec_id: &ExecutionId,
    ) -> Result<Option<ReplaySummary>, LedgerError> {
        self.ensure_initialized()?;
        let Some(cursor) = self.replays.write().await.remove(exec_id) else {
            return Ok(None);
        };
        let summary = cursor.finish();

        info!(
            exec_id = %exec_id,
            final_step_index = summary.final_step_index,
            replay_duration_ms = summary.replay_duration,
            "Replay completed"
        );
        self.bus
            .publish(ConsistencyEvent::ReplayCompleted {
                exec_id: exec_id.clone(),
                final_step_index: summary.final_step_index,
                final_state_hash: summary.final_state_hash,
                replay_duration: summary.replay_duration,
                timestamp: Utc::now(),
            })
            .await;
        Ok(Some(summary))
    }

    /// Dump one execution, or every execution, with the current clock.
    pub async fn export_ledger(
        &self,
        exec_id: Option<&ExecutionId>,
    ) -> Result<LedgerSnapshot, LedgerError> {
        self.ensure_initialized()?;
        let exec_ids = match exec_id {
            Some(id) => vec![id.clone()],
            None => self.repository.execution_ids().await?,
        };

        let mut executions = BTreeMap::new();
        for id in exec_ids {
            let entries = self.repository.entries(&id).await?;
            if !entries.is_empty() {
                executions.insert(id, entries);
            }
        }

        Ok(LedgerSnapshot {
            version: SNAPSHOT_VERSION,
            node_id: self.config.node_id.clone(),
            exported_at: Utc::now(),
            vector_clock: self.vector_clock().await,
            executions,
        })
    }

    /// Replace the partitions carried by a snapshot and merge its clock.
    ///
    /// Refused as a whole if any carried execution is under replay. Chains
    /// that fail validation are still imported, with a warning.
    pub async fn import_ledger(&self, snapshot: LedgerSnapshot) -> Result<usize, LedgerError> {
        self.ensure_initialized()?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(LedgerError::InvalidSnapshot(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }

        let mut guards = Vec::with_capacity(snapshot.executions.len());
        for exec_id in snapshot.executions.keys() {
            guards.push(self.locks.lock(exec_id).await);
        }
        {
            let replays = self.replays.read().await;
            if let Some(exec_id) = snapshot.executions.keys().find(|id| replays.contains_key(*id)) {
                return Err(LedgerError::ReplayInProgress(exec_id.clone()));
            }
        }

        let imported = snapshot.executions.len();
        for (exec_id, entries) in snapshot.executions {
            let validation = ChainValidator::validate(
                &exec_id,
                &entries,
                self.signer.as_ref(),
                self.config.adapter_timeout,
            )
            .await;
            if !validation.is_valid {
                warn!(
                    exec_id = %exec_id,
                    errors = ?validation.errors,
                    "Imported ledger failed validation"
                );
            }
            self.repository.replace(&exec_id, entries).await?;
        }
        self.clock.write().await.merge(&snapshot.vector_clock);
        drop(guards);

        info!(
            source_node = %snapshot.node_id,
            executions = imported,
            "Ledger snapshot imported"
        );
        Ok(imported)
    }

    /// Export through the content store.
    pub async fn persist_snapshot(
        &self,
        exec_id: Option<&ExecutionId>,
    ) -> Result<ContentId, LedgerError> {
        let snapshot = self.export_ledger(exec_id).await?;
        let bytes = snapshot.to_bytes()?;
        let content_id = with_timeout(
            self.config.adapter_timeout,
            "store.put",
            self.store.put(bytes),
        )
        .await?;
        info!(
            content_id = %content_id,
            executions = snapshot.executions.len(),
            "Ledger snapshot persisted"
        );
        Ok(content_id)
    }

    /// Import a snapshot previously written by [`Self::persist_snapshot`].
    pub async fn restore_snapshot(&self, content_id: &ContentId) -> Result<usize, LedgerError> {
        self.ensure_initialized()?;
        let bytes = with_timeout(
            self.config.adapter_timeout,
            "store.get",
            self.store.get(content_id),
        )
        .await?;
        let snapshot = LedgerSnapshot::from_bytes(&bytes)?;
        self.import_ledger(snapshot).await
    }
}
