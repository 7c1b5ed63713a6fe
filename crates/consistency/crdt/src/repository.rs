use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use flowsync_types::ExecutionId;

use crate::error::CrdtError;
use crate::state::CrdtState;

/// Pluggable storage for per-execution CRDT state.
#[async_trait]
pub trait CrdtRepository: Send + Sync {
    async fn load(&self, exec_id: &ExecutionId) -> Result<Option<CrdtState>, CrdtError>;

    /// Insert or replace the state of `state.execution_id`.
    async fn save(&self, state: CrdtState) -> Result<(), CrdtError>;

    /// Every execution with stored state, sorted.
    async fn execution_ids(&self) -> Result<Vec<ExecutionId>, CrdtError>;
}

/// In-memory CRDT storage for testing and single-process deployments.
#[derive(Clone, Default)]
pub struct InMemoryCrdtRepository {
    states: Arc<RwLock<HashMap<ExecutionId, CrdtState>>>,
}

impl InMemoryCrdtRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CrdtRepository for InMemoryCrdtRepository {
    async fn load(&self, exec_id: &ExecutionId) -> Result<Option<CrdtState>, CrdtError> {
        let states = self
            .states
            .read()
            .map_err(|e| CrdtError::Repository(format!("lock poisoned: {}", e)))?;
        Ok(states.get(exec_id).cloned())
    }

    async fn save(&self, state: CrdtState) -> Result<(), CrdtError> {
        let mut states = self
            .states
            .write()
            .map_err(|e| CrdtError::Repository(format!("lock poisoned: {}", e)))?;
        states.insert(state.execution_id.clone(), state);
        Ok(())
    }

    async fn execution_ids(&self) -> Result<Vec<ExecutionId>, CrdtError> {
        let states = self
            .states
            .read()
            .map_err(|e| CrdtError::Repository(format!("lock poisoned: {}", e)))?;
        let mut ids: Vec<ExecutionId> = states.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
