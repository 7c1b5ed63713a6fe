use std::sync::atomic::{AtomicU64, Ordering};

use flowsync_types::ExecutionId;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

use crate::event::{ConsistencyEvent, EventTopic};

/// Default per-subscriber channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Subscription identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub uuid::Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

struct Subscription {
    id: SubscriptionId,
    /// None = all topics
    topics: Option<Vec<EventTopic>>,
    /// None = all executions. Events without an execution always match.
    executions: Option<Vec<ExecutionId>>,
    sender: mpsc::Sender<ConsistencyEvent>,
}

impl Subscription {
    fn matches(&self, event: &ConsistencyEvent) -> bool {
        let topic_match = match &self.topics {
            Some(topics) => topics.contains(&event.topic()),
            None => true,
        };
        let execution_match = match (&self.executions, event.execution_id()) {
            (Some(executions), Some(exec_id)) => executions.contains(exec_id),
            _ => true,
        };
        topic_match && execution_match
    }
}

/// Counters for the bus.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BusMetrics {
    pub events_published: u64,
    pub events_delivered: u64,
    pub events_dropped: u64,
    pub subscribers_active: u32,
}

/// Fan-out of consistency events to filtered subscribers.
///
/// Publishing never blocks the core: a full subscriber channel drops the
/// event with a warning, and closed subscribers are pruned.
pub struct EventBus {
    subscriptions: RwLock<Vec<Subscription>>,
    capacity: usize,
    published: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            subscriptions: RwLock::new(Vec::new()),
            capacity: capacity.max(1),
            published: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Subscribe to events matching the filters.
    pub async fn subscribe(
        &self,
        topics: Option<Vec<EventTopic>>,
        executions: Option<Vec<ExecutionId>>,
    ) -> (SubscriptionId, mpsc::Receiver<ConsistencyEvent>) {
        let (sender, receiver) = mpsc::channel(self.capacity);
        let id = SubscriptionId::new();
        self.subscriptions.write().await.push(Subscription {
            id: id.clone(),
            topics,
            executions,
            sender,
        });
        debug!(subscription_id = ?id.0, "New event subscription registered");
        (id, receiver)
    }

    /// Deliver an event to every matching subscriber.
    /// Returns the number of subscribers that received it.
    pub async fn publish(&self, event: ConsistencyEvent) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);
        let subs = self.subscriptions.read().await;
        let mut delivered = 0;
        let mut closed_ids = Vec::new();

        for sub in subs.iter() {
            if !sub.matches(&event) {
                continue;
            }
            match sub.sender.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        subscription_id = ?sub.id.0,
                        topic = %event.topic(),
                        "Subscriber channel full, dropping event"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed_ids.push(sub.id.clone()),
            }
        }
        drop(subs);

        self.delivered.fetch_add(delivered as u64, Ordering::Relaxed);
        if !closed_ids.is_empty() {
            let mut subs = self.subscriptions.write().await;
            subs.retain(|s| !closed_ids.contains(&s.id));
            debug!(removed = closed_ids.len(), "Cleaned up closed subscriptions");
        }
        delivered
    }

    pub async fn unsubscribe(&self, id: &SubscriptionId) {
        self.subscriptions.write().await.retain(|s| s.id != *id);
        debug!(subscription_id = ?id.0, "Subscription removed");
    }

    pub async fn subscription_count(&self) -> usize {
        self.subscriptions.read().await.len()
    }

    pub async fn metrics(&self) -> BusMetrics {
        BusMetrics {
            events_published: self.published.load(Ordering::Relaxed),
            events_delivered: self.delivered.load(Ordering::Relaxed),
            events_dropped: self.dropped.load(Ordering::Relaxed),
            subscribers_active: self.subscription_count().await as u32,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
