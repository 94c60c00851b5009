//! Error types for meridian-events

use thiserror::Error;

/// Errors that can occur in the event engine
///
/// Only structural misuse surfaces here. Per-event runtime failures
/// (a handler returning an error during delivery or consumption) are
/// recorded in delivery records, dead letters, and the consume error
/// log instead of becoming an `EventError`.
#[derive(Debug, Error)]
pub enum EventError {
    /// Malformed input or configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Subscriber capacity exhausted for a topic pattern
    #[error("Subscriber limit reached for pattern '{pattern}': {limit} registrations")]
    Capacity { pattern: String, limit: usize },

    /// Lookup miss for a sequence number, consumer group, or other entity
    #[error("Not found: {0}")]
    NotFound(String),

    /// Consume refused because the group is paused
    #[error("Consumer group is paused: {0}")]
    GroupPaused(String),

    /// A shared lock was poisoned by a panicking writer
    #[error("Lock poisoned: {0}")]
    Lock(String),
}

/// Result type alias for event operations
pub type Result<T> = std::result::Result<T, EventError>;
