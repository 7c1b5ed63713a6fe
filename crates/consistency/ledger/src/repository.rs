use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use flowsync_types::ExecutionId;

use crate::error::LedgerError;
use crate::record::LedgerEntry;

/// Pluggable storage for ledger partitions, one ordered entry list per execution.
///
/// Callers serialize writes per execution; implementations need only make
/// each call atomic.
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    /// All entries of an execution in index order. Empty if unknown.
    async fn entries(&self, exec_id: &ExecutionId) -> Result<Vec<LedgerEntry>, LedgerError>;

    /// The most recent entry of an execution.
    async fn last_entry(&self, exec_id: &ExecutionId) -> Result<Option<LedgerEntry>, LedgerError>;

    /// Append one entry to the end of an execution's partition.
    async fn append(&self, exec_id: &ExecutionId, entry: LedgerEntry) -> Result<(), LedgerError>;

    /// Replace a whole partition.
    async fn replace(
        &self,
        exec_id: &ExecutionId,
        entries: Vec<LedgerEntry>,
    ) -> Result<(), LedgerError>;

    /// Every execution with at least one entry, sorted.
    async fn execution_ids(&self) -> Result<Vec<ExecutionId>, LedgerError>;
}

/// In-memory ledger storage for testing and single-process deployments.
#[derive(Clone, Default)]
pub struct InMemoryLedgerRepository {
    partitions: Arc<RwLock<HashMap<ExecutionId, Vec<LedgerEntry>>>>,
}

impl InMemoryLedgerRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> LedgerError {
    LedgerError::Repository(format!("lock poisoned: {}", e))
}

#[async_trait]
impl LedgerRepository for InMemoryLedgerRepository {
    async fn entries(&self, exec_id: &ExecutionId) -> Result<Vec<LedgerEntry>, LedgerError> {
        let partitions = self.partitions.read().map_err(poisoned)?;
        Ok(partitions.get(exec_id).cloned().unwrap_or_default())
    }

    async fn last_entry(&self, exec_id: &ExecutionId) -> Result<Option<LedgerEntry>, LedgerError> {
        let partitions = self.partitions.read().map_err(poisoned)?;
        Ok(partitions.get(exec_id).and_then(|p| p.last().cloned()))
    }

    async fn append(&self, exec_id: &ExecutionId, entry: LedgerEntry) -> Result<(), LedgerError> {
        let mut partitions = self.partitions.write().map_err(poisoned)?;
        partitions.entry(exec_id.clone()).or_default().push(entry);
        Ok(())
    }

    async fn replace(
        &self,
        exec_id: &ExecutionId,
        entries: Vec<LedgerEntry>,
    ) -> Result<(), LedgerError> {
        let mut partitions = self.partitions.write().map_err(poisoned)?;
        if entries.is_empty() {
            partitions.remove(exec_id);
        } else {
            partitions.insert(exec_id.clone(), entries);
        }
        Ok(())
    }

    async fn execution_ids(&self) -> Result<Vec<ExecutionId>, LedgerError> {
        let partitions = self.partitions.read().map_err(poisoned)?;
        let mut ids: Vec<ExecutionId> = partitions
            .iter()
            .filter(|(_, entries)| !entries.is_empty())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }
}
