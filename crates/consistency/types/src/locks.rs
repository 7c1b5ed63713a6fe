use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use tokio::sync::OwnedMutexGuard;

/// One async mutex per partition key.
///
/// Writers for the same execution serialize on the same slot; different
/// executions never contend. Slots are created on first use and kept for
/// the lifetime of the table.
pub struct PartitionLocks<K> {
    slots: Mutex<HashMap<K, Arc<tokio::sync::Mutex<()>>>>,
}

impl<K: Eq + Hash + Clone> PartitionLocks<K> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Wait for exclusive access to `key`'s partition.
    pub async fn lock(&self, key: &K) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self
                .slots
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            slots.entry(key.clone()).or_default().clone()
        };
        slot.lock_owned().await
    }

    pub fn partition_count(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

impl<K: Eq + Hash + Clone> Default for PartitionLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}
