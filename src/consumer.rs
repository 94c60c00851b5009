//! Checkpointed consumer groups over the event store
//!
//! Groups pull batches from the shared log instead of receiving pushes.
//! Each group owns one checkpoint that advances past every record it
//! examined, failures included; redelivery only ever happens through an
//! explicit checkpoint reset. Callers serialize consume calls per group.

use crate::config::ConsumerConfig;
use crate::error::{EventError, Result};
use crate::store::EventStore;
use crate::types::EventHandler;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

/// Progress marker for one consumer group
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerCheckpoint {
    /// Group this checkpoint belongs to
    pub consumer_id: String,

    /// Topic the group reads
    pub topic: String,

    /// Highest sequence number examined so far (0 before the first batch)
    pub last_sequence: u64,

    /// Records whose handler invocation succeeded
    pub events_processed: u64,

    /// Records whose handler invocation failed
    pub events_failed: u64,

    /// When the checkpoint last moved
    pub last_updated: DateTime<Utc>,
}

/// Serializable view of a consumer group
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerGroup {
    /// Unique group identifier (grp-<uuid>)
    pub group_id: String,

    /// Caller-supplied display name
    pub name: String,

    /// Category this group consumes, or `*` for everything
    pub topic: String,

    /// Registered member names, sorted
    pub members: Vec<String>,

    /// False while the group is paused
    pub active: bool,

    /// Current progress
    pub checkpoint: ConsumerCheckpoint,
}

/// Outcome of one consume batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeReport {
    /// Records processed successfully
    pub processed: usize,

    /// Records whose handler failed
    pub failed: usize,
}

/// One handler failure recorded during a consume batch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeError {
    /// Group whose handler failed
    pub group_id: String,

    /// Sequence number of the failing record
    pub sequence: u64,

    /// Event that failed
    pub event_id: String,

    /// Handler error message
    pub error: String,

    /// When the failure happened
    pub timestamp: DateTime<Utc>,
}

/// Aggregated view of consumer activity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerStatistics {
    /// Registered groups
    pub groups: usize,

    /// Groups currently active
    pub active_groups: usize,

    /// Records processed across all groups
    pub events_processed: u64,

    /// Records failed across all groups
    pub events_failed: u64,

    /// Entries in the error log
    pub errors_recorded: usize,
}

struct GroupEntry {
    group_id: String,
    name: String,
    topic: String,
    handler: Option<Arc<dyn EventHandler>>,
    members: BTreeSet<String>,
    active: bool,
    checkpoint: ConsumerCheckpoint,
}

impl GroupEntry {
    fn view(&self) -> ConsumerGroup {
        ConsumerGroup {
            group_id: self.group_id.clone(),
            name: self.name.clone(),
            topic: self.topic.clone(),
            members: self.members.iter().cloned().collect(),
            active: self.active,
            checkpoint: self.checkpoint.clone(),
        }
    }
}

/// Consumer group coordinator
///
/// Wraps a shared [`EventStore`] and tracks per-group progress. Handler
/// failures land in a bounded error log; nothing is retried implicitly.
pub struct ConsumerGroups {
    store: Arc<EventStore>,
    config: ConsumerConfig,
    groups: RwLock<HashMap<String, GroupEntry>>,
    errors: RwLock<Vec<ConsumeError>>,
}

impl ConsumerGroups {
    /// Create a coordinator over a store with default configuration
    pub fn new(store: Arc<EventStore>) -> Self {
        Self::with_config(store, ConsumerConfig::default())
    }

    /// Create a coordinator with explicit configuration
    pub fn with_config(store: Arc<EventStore>, config: ConsumerConfig) -> Self {
        Self {
            store,
            config,
            groups: RwLock::new(HashMap::new()),
            errors: RwLock::new(Vec::new()),
        }
    }

    /// Register a group that runs a handler over each consumed record
    ///
    /// `topic` matches the event category exactly, with `*` consuming
    /// everything. New groups start at sequence 0, so their first batch
    /// begins at the head of the log.
    pub fn create_group(
        &self,
        name: &str,
        topic: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<ConsumerGroup> {
        self.register_group(name, topic, Some(handler))
    }

    /// Register a group with no handler
    ///
    /// Consuming through a sink group just advances the checkpoint, which
    /// is enough for lag tracking.
    pub fn create_sink_group(&self, name: &str, topic: &str) -> Result<ConsumerGroup> {
        self.register_group(name, topic, None)
    }

    fn register_group(
        &self,
        name: &str,
        topic: &str,
        handler: Option<Arc<dyn EventHandler>>,
    ) -> Result<ConsumerGroup> {
        if topic.is_empty() {
            return Err(EventError::Config("Group topic cannot be empty".to_string()));
        }

        let group_id = format!("grp-{}", uuid::Uuid::new_v4());
        let entry = GroupEntry {
            group_id: group_id.clone(),
            name: name.to_string(),
            topic: topic.to_string(),
            handler,
            members: BTreeSet::new(),
            active: true,
            checkpoint: ConsumerCheckpoint {
                consumer_id: group_id.clone(),
                topic: topic.to_string(),
                last_sequence: 0,
                events_processed: 0,
                events_failed: 0,
                last_updated: Utc::now(),
            },
        };
        let view = entry.view();

        let mut groups = self
            .groups
            .write()
            .map_err(|e| EventError::Lock(format!("Consumer group table lock poisoned: {}", e)))?;
        groups.insert(group_id.clone(), entry);

        tracing::info!(group = %group_id, name = %name, topic = %topic, "Consumer group created");
        Ok(view)
    }

    /// Add a named member to a group
    ///
    /// Members are bookkeeping only; consumption happens per group.
    /// Returns false when the group is unknown or the name already exists.
    pub fn add_member(&self, group_id: &str, member: &str) -> Result<bool> {
        let mut groups = self
            .groups
            .write()
            .map_err(|e| EventError::Lock(format!("Consumer group table lock poisoned: {}", e)))?;
        match groups.get_mut(group_id) {
            Some(entry) => Ok(entry.members.insert(member.to_string())),
            None => Ok(false),
        }
    }

    /// Remove a named member from a group
    pub fn remove_member(&self, group_id: &str, member: &str) -> Result<bool> {
        let mut groups = self
            .groups
            .write()
            .map_err(|e| EventError::Lock(format!("Consumer group table lock poisoned: {}", e)))?;
        match groups.get_mut(group_id) {
            Some(entry) => Ok(entry.members.remove(member)),
            None => Ok(false),
        }
    }

    /// Pull and process the next batch for a group
    ///
    /// Pulls records past the checkpoint, keeps those matching the group
    /// topic, truncates to `max_events` (defaulting to the configured
    /// batch size), and runs the handler over each record in order. The
    /// checkpoint then advances to the last record examined whether or
    /// not its handler succeeded.
    pub fn consume(&self, group_id: &str, max_events: Option<usize>) -> Result<ConsumeReport> {
        // Snapshot group state so the handler runs without the table lock
        let (topic, handler, from_sequence) = {
            let groups = self
                .groups
                .read()
                .map_err(|e| EventError::Lock(format!("Consumer group table lock poisoned: {}", e)))?;
            let entry = match groups.get(group_id) {
                Some(e) => e,
                None => {
                    return Err(EventError::NotFound(format!(
                        "Consumer group not found: {}",
                        group_id
                    )))
                }
            };
            if !entry.active {
                return Err(EventError::GroupPaused(group_id.to_string()));
            }
            (
                entry.topic.clone(),
                entry.handler.clone(),
                entry.checkpoint.last_sequence,
            )
        };

        let batch_cap = max_events.unwrap_or(self.config.max_batch_size);
        let batch: Vec<_> = self
            .store
            .replay(from_sequence + 1, None, None)?
            .into_iter()
            .filter(|r| topic == "*" || r.event.category == topic)
            .take(batch_cap)
            .collect();

        if batch.is_empty() {
            return Ok(ConsumeReport::default());
        }

        let mut processed = 0;
        let mut failed = 0;
        let mut new_errors = Vec::new();

        for record in &batch {
            let outcome = match &handler {
                Some(h) => h.handle(&record.event),
                None => Ok(()),
            };
            match outcome {
                Ok(()) => processed += 1,
                Err(e) => {
                    failed += 1;
                    new_errors.push(ConsumeError {
                        group_id: group_id.to_string(),
                        sequence: record.sequence_number,
                        event_id: record.event.event_id.clone(),
                        error: e.to_string(),
                        timestamp: Utc::now(),
                    });
                }
            }
        }

        // Failures advance the checkpoint too; only reset_checkpoint redelivers
        let last_examined = batch[batch.len() - 1].sequence_number;
        {
            let mut groups = self
                .groups
                .write()
                .map_err(|e| EventError::Lock(format!("Consumer group table lock poisoned: {}", e)))?;
            if let Some(entry) = groups.get_mut(group_id) {
                entry.checkpoint.last_sequence = last_examined;
                entry.checkpoint.events_processed += processed as u64;
                entry.checkpoint.events_failed += failed as u64;
                entry.checkpoint.last_updated = Utc::now();
            }
        }

        if !new_errors.is_empty() {
            let mut errors = self
                .errors
                .write()
                .map_err(|e| EventError::Lock(format!("Consume error log lock poisoned: {}", e)))?;
            errors.extend(new_errors);
            let cap = self.config.max_errors;
            if cap > 0 && errors.len() > cap {
                let excess = errors.len() - cap;
                errors.drain(..excess);
            }
        }

        tracing::debug!(
            group = %group_id,
            processed,
            failed,
            last_sequence = last_examined,
            "Batch consumed"
        );
        Ok(ConsumeReport { processed, failed })
    }

    /// Move a group's checkpoint to an arbitrary sequence
    ///
    /// Resetting below the current position redelivers records on the
    /// next consume. Returns false for unknown groups.
    pub fn reset_checkpoint(&self, group_id: &str, sequence: u64) -> Result<bool> {
        let mut groups = self
            .groups
            .write()
            .map_err(|e| EventError::Lock(format!("Consumer group table lock poisoned: {}", e)))?;
        match groups.get_mut(group_id) {
            Some(entry) => {
                entry.checkpoint.last_sequence = sequence;
                entry.checkpoint.last_updated = Utc::now();
                tracing::info!(group = %group_id, sequence, "Checkpoint reset");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Pause a group; consume calls fail until resumed
    pub fn pause_group(&self, group_id: &str) -> Result<bool> {
        self.set_active(group_id, false)
    }

    /// Resume a paused group
    pub fn resume_group(&self, group_id: &str) -> Result<bool> {
        self.set_active(group_id, true)
    }

    fn set_active(&self, group_id: &str, active: bool) -> Result<bool> {
        let mut groups = self
            .groups
            .write()
            .map_err(|e| EventError::Lock(format!("Consumer group table lock poisoned: {}", e)))?;
        match groups.get_mut(group_id) {
            Some(entry) => {
                entry.active = active;
                tracing::debug!(group = %group_id, active, "Consumer group state changed");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Get a group's current checkpoint
    pub fn get_checkpoint(&self, group_id: &str) -> Result<Option<ConsumerCheckpoint>> {
        let groups = self
            .groups
            .read()
            .map_err(|e| EventError::Lock(format!("Consumer group table lock poisoned: {}", e)))?;
        Ok(groups.get(group_id).map(|e| e.checkpoint.clone()))
    }

    /// Get a group's current view
    pub fn get_group(&self, group_id: &str) -> Result<Option<ConsumerGroup>> {
        let groups = self
            .groups
            .read()
            .map_err(|e| EventError::Lock(format!("Consumer group table lock poisoned: {}", e)))?;
        Ok(groups.get(group_id).map(GroupEntry::view))
    }

    /// List every registered group
    pub fn list_groups(&self) -> Result<Vec<ConsumerGroup>> {
        let groups = self
            .groups
            .read()
            .map_err(|e| EventError::Lock(format!("Consumer group table lock poisoned: {}", e)))?;
        Ok(groups.values().map(GroupEntry::view).collect())
    }

    /// Get recorded handler failures, most recent first
    pub fn get_errors(&self, limit: usize) -> Result<Vec<ConsumeError>> {
        let errors = self
            .errors
            .read()
            .map_err(|e| EventError::Lock(format!("Consume error log lock poisoned: {}", e)))?;
        Ok(errors.iter().rev().take(limit).cloned().collect())
    }

    /// Get aggregated consumer statistics
    pub fn get_statistics(&self) -> Result<ConsumerStatistics> {
        let groups = self
            .groups
            .read()
            .map_err(|e| EventError::Lock(format!("Consumer group table lock poisoned: {}", e)))?;
        let errors_recorded = self
            .errors
            .read()
            .map_err(|e| EventError::Lock(format!("Consume error log lock poisoned: {}", e)))?
            .len();

        let mut stats = ConsumerStatistics {
            groups: groups.len(),
            errors_recorded,
            ..ConsumerStatistics::default()
        };
        for entry in groups.values() {
            if entry.active {
                stats.active_groups += 1;
            }
            stats.events_processed += entry.checkpoint.events_processed;
            stats.events_failed += entry.checkpoint.events_failed;
        }
        Ok(stats)
    }
}
