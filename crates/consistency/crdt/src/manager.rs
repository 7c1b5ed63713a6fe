use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use chrono::Utc;
use flowsync_adapters::{with_timeout, ContentStore};
use flowsync_events::{ConsistencyEvent, EventBus};
use flowsync_types::{ExecutionId, NodeId, OperationId, PartitionLocks, VectorClock};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::CrdtConfig;
use crate::engine::Engine;
use crate::error::CrdtError;
use crate::operation::{validate_path, CrdtOperation, OperationRequest};
use crate::repository::{CrdtRepository, InMemoryCrdtRepository};
use crate::resolution::{ConflictPolicy, ConflictResolution};
use crate::state::{
    CompactedBase, ConcurrentStateUpdate, CrdtState, MergeReport, StateCompaction, StateDelta,
};

/// The CRDT State Manager.
///
/// Holds one operation log per execution and computes its state as a pure
/// fold, so replicas holding the same operations agree on the result.
/// Mutations of one execution are serialized through [`PartitionLocks`].
pub struct CrdtStateManager {
    config: CrdtConfig,
    store: Arc<dyn ContentStore>,
    repository: Arc<dyn CrdtRepository>,
    bus: Arc<EventBus>,
    policy: Option<Arc<dyn ConflictPolicy>>,
    set_paths: RwLock<BTreeSet<String>>,
    locks: PartitionLocks<ExecutionId>,
}

impl CrdtStateManager {
    pub fn new(
        config: CrdtConfig,
        store: Arc<dyn ContentStore>,
        repository: Arc<dyn CrdtRepository>,
        bus: Arc<EventBus>,
    ) -> Self {
        let set_paths = config.set_paths.iter().cloned().collect();
        Self {
            config,
            store,
            repository,
            bus,
            policy: None,
            set_paths: RwLock::new(set_paths),
            locks: PartitionLocks::new(),
        }
    }

    /// Manager backed by an [`InMemoryCrdtRepository`].
    pub fn in_memory(config: CrdtConfig, store: Arc<dyn ContentStore>, bus: Arc<EventBus>) -> Self {
        Self::new(config, store, Arc::new(InMemoryCrdtRepository::new()), bus)
    }

    /// Install the policy used by the custom resolution strategy.
    pub fn with_policy(mut self, policy: Arc<dyn ConflictPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn node_id(&self) -> &NodeId {
        &self.config.node_id
    }

    /// Treat `path` as an unordered set: concurrent appends there are unions.
    ///
    /// Applies to states computed after the call.
    pub async fn declare_set_path(&self, path: impl Into<String>) -> Result<(), CrdtError> {
        let path = path.into();
        validate_path(&path)?;
        self.set_paths.write().await.insert(path);
        Ok(())
    }

    /// Record a local mutation.
    pub async fn apply_operation(
        &self,
        exec_id: &ExecutionId,
        request: OperationRequest,
    ) -> Result<OperationId, CrdtError> {
        validate_path(&request.path)?;
        if let Some(delta) = request.kind.delta() {
            if !delta.is_finite() {
                return Err(CrdtError::MalformedOperation(format!(
                    "non-finite delta for '{}'",
                    request.path
                )));
            }
        }

        let _guard = self.locks.lock(exec_id).await;
        let mut state = self.load_or_new(exec_id).await?;

        let causality = state.heads();
        state.vector_clock.increment(&self.config.node_id);
        let operation = CrdtOperation {
            operation_id: OperationId::generate(),
            kind: request.kind,
            path: request.path,
            timestamp: request.timestamp.unwrap_or_else(Utc::now),
            node_id: self.config.node_id.clone(),
            vector_clock: state.vector_clock.clone(),
            causality,
        };
        state.operations.push(operation.clone());

        let resolutions = self.refresh(&mut state).await;
        let compaction = self.maybe_auto_compact(&mut state).await;
        self.repository.save(state).await?;

        debug!(
            exec_id = %exec_id,
            operation_id = %operation.operation_id,
            operation_type = operation.kind.type_name(),
            path = %operation.path,
            "Operation applied"
        );
        self.bus
            .publish(ConsistencyEvent::OperationApplied {
                exec_id: exec_id.clone(),
                operation_id: operation.operation_id.clone(),
                operation_type: operation.kind.type_name().to_string(),
                path: operation.path.clone(),
                node_id: operation.node_id.clone(),
                timestamp: operation.timestamp,
            })
            .await;
        self.publish_resolutions(exec_id, &resolutions).await;
        if let Some(compaction) = &compaction {
            self.publish_compaction(compaction).await;
        }

        Ok(operation.operation_id)
    }

    /// Integrate batches of operations from other nodes.
    pub async fn merge_concurrent_updates(
        &self,
        updates: Vec<ConcurrentStateUpdate>,
    ) -> Result<MergeReport, CrdtError> {
        let mut report = MergeReport::default();

        for update in updates {
            let exec_id = update.execution_id.clone();
            let _guard = self.locks.lock(&exec_id).await;
            let mut state = self.load_or_new(&exec_id).await?;

            let mut known: HashSet<OperationId> = state
                .operations
                .iter()
                .map(|op| op.operation_id.clone())
                .collect();
            let mut applied = 0;
            let mut reopen = false;
            for operation in update.operations {
                if known.contains(&operation.operation_id)
                    || state.folded_ids.contains(&operation.operation_id)
                {
                    report.duplicates += 1;
                    continue;
                }
                if let Err(e) = operation.validate() {
                    warn!(
                        exec_id = %exec_id,
                        source_node = %update.source_node,
                        operation_id = %operation.operation_id,
                        error = %e,
                        "Skipping malformed remote operation"
                    );
                    report.malformed += 1;
                    continue;
                }
                reopen |= state.precedes_base(&operation);
                known.insert(operation.operation_id.clone());
                state.vector_clock.merge(&operation.vector_clock);
                state.operations.push(operation);
                applied += 1;
            }
            if update.source_node != self.config.node_id {
                state
                    .peer_clocks
                    .entry(update.source_node.clone())
                    .or_default()
                    .merge(&update.vector_clock);
            }
            if reopen {
                self.reopen_base(&mut state).await?;
            }
            report.applied += applied;

            let resolutions = self.refresh(&mut state).await;
            report.conflicts_resolved += resolutions.len();
            let compaction = self.maybe_auto_compact(&mut state).await;
            self.repository.save(state).await?;

            debug!(
                exec_id = %exec_id,
                source_node = %update.source_node,
                applied,
                conflicts = resolutions.len(),
                "Merged concurrent update"
            );
            self.publish_resolutions(&exec_id, &resolutions).await;
            if let Some(compaction) = &compaction {
                self.publish_compaction(compaction).await;
            }
        }

        Ok(report)
    }

    /// Current state document; an empty object for unknown executions.
    pub async fn get_current_state(&self, exec_id: &ExecutionId) -> Result<Value, CrdtError> {
        Ok(self.load_or_new(exec_id).await?.current_state)
    }

    pub async fn get_operation_log(
        &self,
        exec_id: &ExecutionId,
    ) -> Result<Vec<CrdtOperation>, CrdtError> {
        Ok(self.load_or_new(exec_id).await?.operations)
    }

    pub async fn get_conflict_resolutions(
        &self,
        exec_id: &ExecutionId,
    ) -> Result<Vec<ConflictResolution>, CrdtError> {
        Ok(self.load_or_new(exec_id).await?.conflict_resolutions)
    }

    pub async fn get_compactions(
        &self,
        exec_id: &ExecutionId,
    ) -> Result<Vec<StateCompaction>, CrdtError> {
        Ok(self.load_or_new(exec_id).await?.compactions)
    }

    pub async fn get_vector_clock(&self, exec_id: &ExecutionId) -> Result<VectorClock, CrdtError> {
        Ok(self.load_or_new(exec_id).await?.vector_clock)
    }

    /// Operations whose clocks are not covered by `since` (all when `None`).
    ///
    /// Folded operations are read back from the compacted bases when `since`
    /// does not cover the base, so a peer that missed them still gets the
    /// full history.
    pub async fn create_state_delta(
        &self,
        exec_id: &ExecutionId,
        since: Option<&VectorClock>,
    ) -> Result<StateDelta, CrdtError> {
        let state = self.load_or_new(exec_id).await?;
        let missing =
            |op: &CrdtOperation| since.map_or(true, |s| !op.vector_clock.is_covered_by(s));

        let mut operations = Vec::new();
        if state.base_content_id.is_some()
            && since.map_or(true, |s| !state.base_clock.is_covered_by(s))
        {
            let archived = self.archived_operations(&state).await?;
            operations.extend(archived.into_iter().filter(|op| missing(op)));
        }
        operations.extend(state.operations.into_iter().filter(|op| missing(op)));
        Ok(StateDelta {
            execution_id: exec_id.clone(),
            operations,
            vector_clock: state.vector_clock,
            since: since.cloned(),
        })
    }

    /// Fold the operations at or before `cutoff` into the base state.
    ///
    /// `cutoff` defaults to the causally stable clock: what this node and
    /// every peer it has heard from have all seen. The current state is
    /// unchanged.
    pub async fn compact_state(
        &self,
        exec_id: &ExecutionId,
        cutoff: Option<VectorClock>,
    ) -> Result<StateCompaction, CrdtError> {
        let _guard = self.locks.lock(exec_id).await;
        let mut state = self.load_or_new(exec_id).await?;
        let compaction = self.compact_locked(&mut state, cutoff).await?;
        self.repository.save(state).await?;
        self.publish_compaction(&compaction).await;
        Ok(compaction)
    }

    async fn load_or_new(&self, exec_id: &ExecutionId) -> Result<CrdtState, CrdtError> {
        Ok(self
            .repository
            .load(exec_id)
            .await?
            .unwrap_or_else(|| CrdtState::new(exec_id.clone())))
    }

    /// Recompute the cached state and record resolutions for new conflict
    /// groups. Returns the new resolutions.
    async fn refresh(&self, state: &mut CrdtState) -> Vec<ConflictResolution> {
        let set_paths = self.set_paths.read().await.clone();
        let engine = Engine {
            set_paths: &set_paths,
            strategy: self.config.strategy,
            policy: self.policy.as_deref(),
        };
        let outcome = engine.fold(&state.base_state, &state.operations);
        state.current_state = outcome.state;

        let mut fresh = Vec::new();
        for group in outcome.resolved {
            if state.has_resolution(&group.conflict_id) {
                continue;
            }
            let resolution = ConflictResolution {
                conflict_id: group.conflict_id,
                operation_ids: group.operation_ids,
                path: group.path,
                resolution_strategy: self.config.strategy,
                resolved_value: group.resolved_value,
                resolved_at: Utc::now(),
                resolved_by: self.config.node_id.clone(),
            };
            state.conflict_resolutions.push(resolution.clone());
            fresh.push(resolution);
        }
        fresh
    }

    async fn compact_locked(
        &self,
        state: &mut CrdtState,
        cutoff: Option<VectorClock>,
    ) -> Result<StateCompaction, CrdtError> {
        let cutoff = cutoff.unwrap_or_else(|| state.stable_clock());
        let set_paths = self.set_paths.read().await.clone();
        let engine = Engine {
            set_paths: &set_paths,
            strategy: self.config.strategy,
            policy: self.policy.as_deref(),
        };

        let prefix = engine.compaction_prefix(&state.operations, &cutoff);
        let folded: Vec<CrdtOperation> = prefix
            .iter()
            .map(|&i| state.operations[i].clone())
            .collect();
        let outcome = engine.fold(&state.base_state, &folded);
        let mut base_clock = state.base_clock.clone();
        for op in &folded {
            base_clock.merge(&op.vector_clock);
        }

        let blob = CompactedBase {
            execution_id: state.execution_id.clone(),
            base_state: outcome.state.clone(),
            base_clock: base_clock.clone(),
            operations: folded.clone(),
            previous: state.base_content_id.clone(),
        };
        let bytes = serde_json::to_vec(&blob)?;
        let content_id = with_timeout(
            self.config.adapter_timeout,
            "store.put",
            self.store.put(bytes),
        )
        .await?;

        let before = state.operations.len();
        let dropped: HashSet<&OperationId> = folded.iter().map(|op| &op.operation_id).collect();
        state
            .operations
            .retain(|op| !dropped.contains(&op.operation_id));
        state.base_state = outcome.state;
        state.base_clock = base_clock;
        state.base_content_id = Some(content_id.clone());
        state
            .folded_ids
            .extend(folded.into_iter().map(|op| op.operation_id));
        let compacted_at = Utc::now();
        state.last_compacted = Some(compacted_at);

        let compaction = StateCompaction {
            compaction_id: uuid::Uuid::new_v4().to_string(),
            execution_id: state.execution_id.clone(),
            before_operation_count: before,
            after_operation_count: state.operations.len(),
            compacted_state: state.base_state.clone(),
            compacted_at,
            content_id,
            cutoff,
        };
        state.compactions.push(compaction.clone());
        self.refresh(state).await;

        info!(
            exec_id = %compaction.execution_id,
            before = compaction.before_operation_count,
            after = compaction.after_operation_count,
            content_id = %compaction.content_id,
            "State compacted"
        );
        Ok(compaction)
    }

    /// Put every folded operation back in the log and start over from an
    /// empty base. Needed when an operation arrives that does not follow
    /// the whole base, since it may order before or conflict with folded
    /// operations.
    async fn reopen_base(&self, state: &mut CrdtState) -> Result<(), CrdtError> {
        let mut operations = self.archived_operations(state).await?;
        let restored = operations.len();
        operations.append(&mut state.operations);
        state.operations = operations;
        state.base_state = Value::Object(Map::new());
        state.base_clock = VectorClock::new();
        state.base_content_id = None;
        state.folded_ids.clear();
        info!(
            exec_id = %state.execution_id,
            restored,
            "Compacted base reopened for a late concurrent operation"
        );
        Ok(())
    }

    /// Every folded operation, oldest compaction first.
    async fn archived_operations(
        &self,
        state: &CrdtState,
    ) -> Result<Vec<CrdtOperation>, CrdtError> {
        let mut chain = Vec::new();
        let mut next = state.base_content_id.clone();
        while let Some(content_id) = next {
            let bytes = with_timeout(
                self.config.adapter_timeout,
                "store.get",
                self.store.get(&content_id),
            )
            .await?;
            let base: CompactedBase = serde_json::from_slice(&bytes)?;
            next = base.previous;
            chain.push(base.operations);
        }
        chain.reverse();
        Ok(chain.into_iter().flatten().collect())
    }

    async fn maybe_auto_compact(&self, state: &mut CrdtState) -> Option<StateCompaction> {
        let threshold = self.config.auto_compact_threshold?;
        if state.operations.len() <= threshold {
            return None;
        }
        let stable = state.stable_clock();
        if !state
            .operations
            .iter()
            .any(|op| op.vector_clock.is_covered_by(&stable))
        {
            return None;
        }
        match self.compact_locked(state, None).await {
            Ok(compaction) => Some(compaction),
            Err(e) => {
                warn!(exec_id = %state.execution_id, error = %e, "Automatic compaction failed");
                None
            }
        }
    }

    async fn publish_resolutions(&self, exec_id: &ExecutionId, resolutions: &[ConflictResolution]) {
        for resolution in resolutions {
            info!(
                exec_id = %exec_id,
                conflict_id = ?resolution.conflict_id,
                path = %resolution.path,
                strategy = %resolution.resolution_strategy,
                "Conflict resolved"
            );
            self.bus
                .publish(ConsistencyEvent::ConflictResolved {
                    exec_id: exec_id.clone(),
                    conflict_id: resolution.conflict_id,
                    operation_ids: resolution.operation_ids.clone(),
                    path: resolution.path.clone(),
                    strategy: resolution.resolution_strategy.as_str().to_string(),
                    resolved_by: resolution.resolved_by.clone(),
                    timestamp: resolution.resolved_at,
                })
                .await;
        }
    }

    async fn publish_compaction(&self, compaction: &StateCompaction) {
        self.bus
            .publish(ConsistencyEvent::StateCompacted {
                exec_id: compaction.execution_id.clone(),
                compaction_id: compaction.compaction_id.clone(),
                before_operation_count: compaction.before_operation_count as u64,
                after_operation_count: compaction.after_operation_count as u64,
                content_id: compaction.content_id.clone(),
                timestamp: compaction.compacted_at,
            })
            .await;
    }
}
