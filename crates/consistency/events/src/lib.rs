#![deny(unsafe_code)]
//! # flowsync-events
//!
//! Structured events published by the execution ledger and the CRDT state
//! manager, and the [`EventBus`] that carries them to telemetry and audit
//! consumers.
//!
//! The bus is an explicit value handed to each component at construction;
//! there is no process-global emitter.

pub mod bus;
pub mod event;

pub use bus::{BusMetrics, EventBus, SubscriptionId, DEFAULT_CHANNEL_CAPACITY};
pub use event::{ConsistencyEvent, EventTopic};
