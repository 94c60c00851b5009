//! # meridian-events
//!
//! In-process event messaging and event sourcing for the Meridian platform.
//!
//! ## Overview
//!
//! `meridian-events` combines four cooperating components behind one crate:
//! a topic-based [`EventBus`] with bounded retry and dead-lettering, an
//! append-only [`EventStore`] assigning gapless sequence numbers with
//! aggregate indexing and snapshots, checkpointed [`ConsumerGroups`] that
//! pull batches from the store, and a versioned [`SchemaRegistry`] for
//! payload validation. Everything runs synchronously on the caller's
//! thread; there is no background runtime.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use meridian_events::{EventBus, EventEnvelope, EventStore, NoopHandler};
//!
//! # fn example() -> meridian_events::Result<()> {
//! // Live pub/sub with bounded retry
//! let bus = EventBus::new();
//! let subscriber = bus.subscribe("audit", "orders.*", Arc::new(NoopHandler))?;
//!
//! let event = EventEnvelope::new("order.created", "orders", "router", Default::default())
//!     .with_field("symbol", serde_json::json!("AAPL"));
//! let deliveries = bus.publish("orders.created", &event)?;
//! assert_eq!(deliveries.len(), 1);
//! bus.unsubscribe(&subscriber.subscriber_id)?;
//!
//! // Durable ordering through the store
//! let store = Arc::new(EventStore::new());
//! let record = store.append(event)?;
//! assert_eq!(record.sequence_number, 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **EventBus** — synchronous fan-out to pattern-matched subscribers,
//!   with per-delivery retry, a delivery log, and a dead letter queue
//! - **EventStore** — the ordered log; the only component that assigns
//!   sequence numbers
//! - **ConsumerGroups** — pull-based consumption with per-group
//!   checkpoints; failures advance and are logged, never retried
//! - **SchemaRegistry** — versioned payload schemas with advisory
//!   validation and compatibility checks
//! - **EventHandler** — the single capability trait subscribers and
//!   groups implement; handler errors are data, not panics

pub mod bus;
pub mod config;
pub mod consumer;
pub mod error;
pub mod schema;
pub mod store;
pub mod topic;
pub mod types;

// Re-export core types
pub use bus::{
    BusStatistics, DeadLetter, DeliveryRecord, DeliveryStatus, EventBus, SubscriberInfo,
    SubscriberState,
};
pub use config::{BusConfig, ConsumerConfig};
pub use consumer::{
    ConsumeError, ConsumeReport, ConsumerCheckpoint, ConsumerGroup, ConsumerGroups,
    ConsumerStatistics,
};
pub use error::{EventError, Result};
pub use schema::{SchemaDefinition, SchemaRegistry, ValidationReport};
pub use store::{EventRecord, EventStore, Snapshot, StoreStatistics};
pub use types::{
    EventEnvelope, EventFilter, EventHandler, EventPriority, FnHandler, HandlerError,
    HandlerResult, NoopHandler,
};
