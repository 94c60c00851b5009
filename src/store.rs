//! Append-only event store with aggregate indexing and snapshots
//!
//! The store is the durable-ordering half of the engine: every appended
//! event receives the next sequence number in a single gapless, 1-based
//! store-wide order. Events are never mutated or deleted once appended.

use crate::error::{EventError, Result};
use crate::types::EventEnvelope;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// A stored event with its position in the log
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    /// Position in the store-wide order, starting at 1
    pub sequence_number: u64,

    /// The event as appended
    pub event: EventEnvelope,

    /// Aggregate this event belongs to, if appended for one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate_id: Option<String>,

    /// Kind of the aggregate (e.g., "order", "account")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate_type: Option<String>,

    /// When the store accepted the event
    pub stored_at: DateTime<Utc>,
}

/// Point-in-time state capture for one aggregate
///
/// A snapshot stands in for every event of its aggregate up to and
/// including its sequence number. Each aggregate keeps at most one
/// snapshot; a new one replaces the old.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Unique snapshot identifier (snap-<uuid>)
    pub snapshot_id: String,

    /// Aggregate the state belongs to
    pub aggregate_id: String,

    /// Kind of the aggregate
    pub aggregate_type: String,

    /// Materialized state as named fields
    pub state: HashMap<String, serde_json::Value>,

    /// Store-wide sequence the state reflects
    pub sequence_number: u64,

    /// When the snapshot was taken
    pub created_at: DateTime<Utc>,
}

/// Aggregated view of store contents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStatistics {
    /// Number of events appended so far
    pub total_events: u64,

    /// Sequence number of the newest event (0 when empty)
    pub current_sequence: u64,

    /// Number of distinct aggregates with at least one event
    pub aggregates: usize,

    /// Number of aggregates holding a snapshot
    pub snapshots: usize,

    /// Event counts per event type
    pub event_types: HashMap<String, u64>,
}

#[derive(Default)]
struct StoreInner {
    /// The log itself; index i holds sequence i + 1
    records: Vec<EventRecord>,

    /// aggregate_id → ascending sequence numbers
    aggregate_index: HashMap<String, Vec<u64>>,

    /// aggregate_id → latest snapshot
    snapshots: HashMap<String, Snapshot>,

    /// event_type → appended count
    type_counts: HashMap<String, u64>,
}

/// In-memory append-only event store
///
/// All access goes through one reader-writer lock, so appends serialize
/// and reads see a consistent log. Contents are lost on process restart.
pub struct EventStore {
    inner: RwLock<StoreInner>,
}

impl EventStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
        }
    }

    /// Append an event to the log
    ///
    /// Returns the stored record carrying the assigned sequence number.
    pub fn append(&self, event: EventEnvelope) -> Result<EventRecord> {
        self.append_record(event, None, None)
    }

    /// Append an event on behalf of an aggregate
    ///
    /// The event additionally lands in the aggregate's index, preserving
    /// the store-wide order within the aggregate's history.
    pub fn append_for_aggregate(
        &self,
        event: EventEnvelope,
        aggregate_id: impl Into<String>,
        aggregate_type: impl Into<String>,
    ) -> Result<EventRecord> {
        self.append_record(event, Some(aggregate_id.into()), Some(aggregate_type.into()))
    }

    fn append_record(
        &self,
        event: EventEnvelope,
        aggregate_id: Option<String>,
        aggregate_type: Option<String>,
    ) -> Result<EventRecord> {
        if event.event_type.is_empty() {
            return Err(EventError::Config("Event type cannot be empty".to_string()));
        }
        if event.version == 0 {
            return Err(EventError::Config("Event version must be >= 1".to_string()));
        }

        let mut inner = self
            .inner
            .write()
            .map_err(|e| EventError::Lock(format!("Event store lock poisoned: {}", e)))?;

        let sequence = inner.records.len() as u64 + 1;
        let record = EventRecord {
            sequence_number: sequence,
            event,
            aggregate_id,
            aggregate_type,
            stored_at: Utc::now(),
        };

        if let Some(id) = &record.aggregate_id {
            inner.aggregate_index.entry(id.clone()).or_default().push(sequence);
        }
        *inner
            .type_counts
            .entry(record.event.event_type.clone())
            .or_insert(0) += 1;

        tracing::debug!(
            sequence,
            event_id = %record.event.event_id,
            event_type = %record.event.event_type,
            "Event appended"
        );

        inner.records.push(record.clone());
        Ok(record)
    }

    /// Get the event at a sequence number
    pub fn get_event(&self, sequence: u64) -> Result<EventRecord> {
        let inner = self
            .inner
            .read()
            .map_err(|e| EventError::Lock(format!("Event store lock poisoned: {}", e)))?;

        if sequence < 1 || sequence > inner.records.len() as u64 {
            return Err(EventError::NotFound(format!(
                "No event at sequence {}",
                sequence
            )));
        }
        Ok(inner.records[(sequence - 1) as usize].clone())
    }

    /// Replay a range of the log in sequence order
    ///
    /// The range is inclusive on both ends; `to_sequence` None means the
    /// end of the log. Bounds beyond the log clamp to it, and an inverted
    /// range yields an empty batch. `event_type` restricts the result to
    /// one type without affecting sequence numbering.
    pub fn replay(
        &self,
        from_sequence: u64,
        to_sequence: Option<u64>,
        event_type: Option<&str>,
    ) -> Result<Vec<EventRecord>> {
        let inner = self
            .inner
            .read()
            .map_err(|e| EventError::Lock(format!("Event store lock poisoned: {}", e)))?;

        let len = inner.records.len() as u64;
        let from = from_sequence.max(1);
        let to = to_sequence.unwrap_or(len).min(len);
        if from > to {
            return Ok(Vec::new());
        }

        let range = &inner.records[(from - 1) as usize..to as usize];
        Ok(range
            .iter()
            .filter(|r| event_type.map_or(true, |t| r.event.event_type == t))
            .cloned()
            .collect())
    }

    /// Get an aggregate's events after a sequence floor
    ///
    /// Passing 0 returns the aggregate's full history. Unknown aggregates
    /// yield an empty batch.
    pub fn get_aggregate_events(
        &self,
        aggregate_id: &str,
        from_sequence: u64,
    ) -> Result<Vec<EventRecord>> {
        let inner = self
            .inner
            .read()
            .map_err(|e| EventError::Lock(format!("Event store lock poisoned: {}", e)))?;
        Ok(aggregate_events_after(&inner, aggregate_id, from_sequence))
    }

    /// Take a snapshot of an aggregate's current state
    ///
    /// The snapshot records the store-wide sequence at creation time and
    /// replaces any earlier snapshot of the same aggregate.
    pub fn create_snapshot(
        &self,
        aggregate_id: &str,
        aggregate_type: &str,
        state: HashMap<String, serde_json::Value>,
    ) -> Result<Snapshot> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| EventError::Lock(format!("Event store lock poisoned: {}", e)))?;

        let snapshot = Snapshot {
            snapshot_id: format!("snap-{}", uuid::Uuid::new_v4()),
            aggregate_id: aggregate_id.to_string(),
            aggregate_type: aggregate_type.to_string(),
            state,
            sequence_number: inner.records.len() as u64,
            created_at: Utc::now(),
        };

        inner
            .snapshots
            .insert(aggregate_id.to_string(), snapshot.clone());
        tracing::debug!(
            aggregate = %aggregate_id,
            sequence = snapshot.sequence_number,
            "Snapshot created"
        );
        Ok(snapshot)
    }

    /// Get the latest snapshot of an aggregate
    pub fn get_snapshot(&self, aggregate_id: &str) -> Result<Option<Snapshot>> {
        let inner = self
            .inner
            .read()
            .map_err(|e| EventError::Lock(format!("Event store lock poisoned: {}", e)))?;
        Ok(inner.snapshots.get(aggregate_id).cloned())
    }

    /// Rehydration fast path for one aggregate
    ///
    /// Returns the latest snapshot, if any, along with the aggregate's
    /// events past the snapshot's sequence. Without a snapshot the full
    /// history comes back.
    pub fn replay_from_snapshot(
        &self,
        aggregate_id: &str,
    ) -> Result<(Option<Snapshot>, Vec<EventRecord>)> {
        let inner = self
            .inner
            .read()
            .map_err(|e| EventError::Lock(format!("Event store lock poisoned: {}", e)))?;

        let snapshot = inner.snapshots.get(aggregate_id).cloned();
        let floor = snapshot.as_ref().map_or(0, |s| s.sequence_number);
        let events = aggregate_events_after(&inner, aggregate_id, floor);
        Ok((snapshot, events))
    }

    /// Sequence number of the newest event (0 when the store is empty)
    pub fn current_sequence(&self) -> Result<u64> {
        let inner = self
            .inner
            .read()
            .map_err(|e| EventError::Lock(format!("Event store lock poisoned: {}", e)))?;
        Ok(inner.records.len() as u64)
    }

    /// Get aggregated store statistics
    pub fn get_statistics(&self) -> Result<StoreStatistics> {
        let inner = self
            .inner
            .read()
            .map_err(|e| EventError::Lock(format!("Event store lock poisoned: {}", e)))?;

        Ok(StoreStatistics {
            total_events: inner.records.len() as u64,
            current_sequence: inner.records.len() as u64,
            aggregates: inner.aggregate_index.len(),
            snapshots: inner.snapshots.len(),
            event_types: inner.type_counts.clone(),
        })
    }
}

impl Default for EventStore {
    fn default() -> Self {
        Self::new()
    }
}

fn aggregate_events_after(
    inner: &StoreInner,
    aggregate_id: &str,
    after: u64,
) -> Vec<EventRecord> {
    let sequences = match inner.aggregate_index.get(aggregate_id) {
        Some(s) => s,
        None => return Vec::new(),
    };
    sequences
        .iter()
        .filter(|&&seq| seq > after)
        .map(|&seq| inner.records[(seq - 1) as usize].clone())
        .collect()
}
