//! Core event types for the meridian-events engine
//!
//! Everything here serializes as camelCase JSON for wire compatibility.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Delivery priority carried by every envelope
///
/// Priority is descriptive metadata for subscribers and filters. The bus
/// itself delivers in registration order regardless of priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventPriority {
    Critical,
    High,
    #[default]
    Normal,
    Low,
}

/// The canonical event envelope
///
/// Envelopes are immutable once published: the bus, store, and consumer
/// layers clone them but never mutate them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    /// Unique event identifier (evt-<uuid>)
    pub event_id: String,

    /// Event type identifier (e.g., "order.created", "deploy.completed")
    ///
    /// Used by the schema registry to look up validation rules.
    pub event_type: String,

    /// Top-level category for grouping (e.g., "orders", "system")
    ///
    /// Consumer groups filter the shared log by category.
    pub category: String,

    /// Source system or service that produced this event
    pub source: String,

    /// Delivery priority, defaults to normal
    #[serde(default)]
    pub priority: EventPriority,

    /// When the envelope was created
    pub timestamp: DateTime<Utc>,

    /// Event payload as named fields
    ///
    /// Schema validation checks required field names against this map.
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,

    /// Schema version for this event type
    ///
    /// Incremented when the payload schema changes. Defaults to 1.
    #[serde(default = "default_version")]
    pub version: u32,

    /// Identifier linking this event to the request that caused it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,

    /// Identifier of the event that directly caused this one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub causation_id: Option<String>,

    /// Optional key-value metadata
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

fn default_version() -> u32 {
    1
}

impl EventEnvelope {
    /// Create a new envelope with auto-generated id and timestamp
    pub fn new(
        event_type: impl Into<String>,
        category: impl Into<String>,
        source: impl Into<String>,
        data: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            event_id: format!("evt-{}", uuid::Uuid::new_v4()),
            event_type: event_type.into(),
            category: category.into(),
            source: source.into(),
            priority: EventPriority::Normal,
            timestamp: Utc::now(),
            data,
            version: 1,
            correlation_id: None,
            causation_id: None,
            metadata: HashMap::new(),
        }
    }

    /// Set the delivery priority
    pub fn with_priority(mut self, priority: EventPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the schema version
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Add a payload field
    pub fn with_field(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Link this event to the request that caused it
    pub fn with_correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Link this event to the event that directly caused it
    pub fn with_causation(mut self, causation_id: impl Into<String>) -> Self {
        self.causation_id = Some(causation_id.into());
        self
    }

    /// Add a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Error type reported by a failing handler
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Outcome of a single handler invocation
pub type HandlerResult = std::result::Result<(), HandlerError>;

/// Capability interface implemented by event consumers
///
/// The engine never inspects a handler beyond invoking it and observing
/// success or failure. Handlers run on the publishing (or consuming)
/// thread while no engine lock is held, so they may call back into the
/// engine, but they must not block indefinitely.
pub trait EventHandler: Send + Sync {
    /// Process one event
    fn handle(&self, event: &EventEnvelope) -> HandlerResult;
}

/// Adapter that lets a closure act as an [`EventHandler`]
pub struct FnHandler<F> {
    f: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&EventEnvelope) -> HandlerResult + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&EventEnvelope) -> HandlerResult + Send + Sync,
{
    fn handle(&self, event: &EventEnvelope) -> HandlerResult {
        (self.f)(event)
    }
}

/// Handler that accepts every event without doing anything
///
/// Used when a subscriber or group only needs delivery bookkeeping.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandler;

impl EventHandler for NoopHandler {
    fn handle(&self, _event: &EventEnvelope) -> HandlerResult {
        Ok(())
    }
}

/// Predicate applied to an event before delivery to one subscriber
///
/// Returning false skips the subscriber without recording a delivery.
pub type EventFilter = Arc<dyn Fn(&EventEnvelope) -> bool + Send + Sync>;
