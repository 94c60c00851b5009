//! Topic-based publish/subscribe bus with bounded retry and dead letters
//!
//! Delivery is synchronous: `publish` walks every active subscriber whose
//! pattern matches the topic, runs its filter and handler inline, retries
//! failures up to the configured bound, and classifies whatever remains as
//! failed or dead-lettered. Handler errors are recorded, never raised.

use crate::config::BusConfig;
use crate::error::{EventError, Result};
use crate::topic::pattern_matches;
use crate::types::{EventEnvelope, EventFilter, EventHandler};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

/// Lifecycle state of a subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriberState {
    /// Receiving deliveries
    Active,
    /// Registered but skipped during publish; resumable
    Paused,
    /// Terminal; assigned when the subscriber is removed from the bus
    Stopped,
}

/// Outcome classification of one (event, subscriber) delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeliveryStatus {
    /// Delivery created but no attempt finished yet
    Pending,
    /// A handler invocation succeeded
    Delivered,
    /// All attempts failed with dead-lettering disabled
    Failed,
    /// All attempts failed and the event went to the dead letter queue
    DeadLetter,
}

/// One entry in the append-only delivery log
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryRecord {
    /// Event that was delivered
    pub event_id: String,

    /// Subscriber it was delivered to
    pub subscriber_id: String,

    /// Final classification of this delivery
    pub status: DeliveryStatus,

    /// Handler invocations performed, including the successful one
    pub attempts: u32,

    /// Message of the most recent handler failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    /// When the successful attempt finished
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
}

/// An event whose delivery exhausted every retry attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    /// Topic the event was published under
    pub topic: String,

    /// The event itself, kept whole for reprocessing
    pub event: EventEnvelope,

    /// Subscriber whose handler kept failing
    pub subscriber_id: String,

    /// Attempts made before giving up
    pub attempts: u32,

    /// Message of the final failure
    pub last_error: String,

    /// When the event was dead-lettered
    pub dead_lettered_at: DateTime<Utc>,
}

/// Serializable view of a subscriber
///
/// Handlers and filters stay inside the bus; this is everything callers
/// get to see.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriberInfo {
    /// Unique subscriber identifier (sub-<uuid>)
    pub subscriber_id: String,

    /// Caller-supplied display name, not required to be unique
    pub name: String,

    /// Pattern this subscriber receives topics for
    pub topic_pattern: String,

    /// Current lifecycle state
    pub state: SubscriberState,

    /// Deliveries that reached the handler successfully
    pub events_received: u64,

    /// Deliveries that exhausted their attempts
    pub events_failed: u64,
}

/// Aggregated view of bus activity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusStatistics {
    /// Registered subscribers in any state
    pub subscribers: usize,

    /// Subscribers currently active
    pub active_subscribers: usize,

    /// Subscribers currently paused
    pub paused_subscribers: usize,

    /// Publish calls accepted
    pub events_published: u64,

    /// Deliveries classified as delivered
    pub deliveries_succeeded: u64,

    /// Deliveries classified as failed
    pub deliveries_failed: u64,

    /// Deliveries classified as dead-lettered
    pub events_dead_lettered: u64,

    /// Entries in the delivery log
    pub delivery_log_size: usize,

    /// Entries in the dead letter queue
    pub dead_letter_queue_size: usize,
}

struct Subscriber {
    id: String,
    name: String,
    topic_pattern: String,
    handler: Option<Arc<dyn EventHandler>>,
    filter: Option<EventFilter>,
    state: SubscriberState,
    events_received: u64,
    events_failed: u64,
}

impl Subscriber {
    fn info(&self) -> SubscriberInfo {
        SubscriberInfo {
            subscriber_id: self.id.clone(),
            name: self.name.clone(),
            topic_pattern: self.topic_pattern.clone(),
            state: self.state,
            events_received: self.events_received,
            events_failed: self.events_failed,
        }
    }
}

#[derive(Default)]
struct BusCounters {
    events_published: u64,
    delivered: u64,
    failed: u64,
    dead_lettered: u64,
}

/// In-process topic pub/sub bus
///
/// Each shared structure sits behind its own lock, acquired one at a
/// time. Handlers and filters always run with no bus lock held, so they
/// may publish or subscribe reentrantly.
pub struct EventBus {
    config: BusConfig,
    subscribers: RwLock<HashMap<String, Subscriber>>,
    delivery_log: RwLock<Vec<DeliveryRecord>>,
    dead_letters: RwLock<Vec<DeadLetter>>,
    counters: Mutex<BusCounters>,
}

impl EventBus {
    /// Create a bus with default configuration
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    /// Create a bus with explicit configuration
    pub fn with_config(config: BusConfig) -> Self {
        Self {
            config,
            subscribers: RwLock::new(HashMap::new()),
            delivery_log: RwLock::new(Vec::new()),
            dead_letters: RwLock::new(Vec::new()),
            counters: Mutex::new(BusCounters::default()),
        }
    }

    /// The configuration this bus runs with
    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Register a handler for every topic matching a pattern
    pub fn subscribe(
        &self,
        name: &str,
        topic_pattern: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<SubscriberInfo> {
        self.register(name, topic_pattern, Some(handler), None)
    }

    /// Register a handler guarded by a per-event filter
    ///
    /// The filter runs before each delivery; events it rejects are skipped
    /// for this subscriber without any delivery record.
    pub fn subscribe_with_filter(
        &self,
        name: &str,
        topic_pattern: &str,
        handler: Arc<dyn EventHandler>,
        filter: EventFilter,
    ) -> Result<SubscriberInfo> {
        self.register(name, topic_pattern, Some(handler), Some(filter))
    }

    /// Register a subscriber with no handler
    ///
    /// Deliveries to a sink always succeed; useful when only the delivery
    /// log and counters matter.
    pub fn subscribe_sink(&self, name: &str, topic_pattern: &str) -> Result<SubscriberInfo> {
        self.register(name, topic_pattern, None, None)
    }

    fn register(
        &self,
        name: &str,
        topic_pattern: &str,
        handler: Option<Arc<dyn EventHandler>>,
        filter: Option<EventFilter>,
    ) -> Result<SubscriberInfo> {
        if topic_pattern.is_empty() {
            return Err(EventError::Config(
                "Topic pattern cannot be empty".to_string(),
            ));
        }

        let mut subscribers = self
            .subscribers
            .write()
            .map_err(|e| EventError::Lock(format!("Subscriber table lock poisoned: {}", e)))?;

        let limit = self.config.max_subscribers_per_topic;
        if limit > 0 {
            let registered = subscribers
                .values()
                .filter(|s| s.topic_pattern == topic_pattern)
                .count();
            if registered >= limit {
                return Err(EventError::Capacity {
                    pattern: topic_pattern.to_string(),
                    limit,
                });
            }
        }

        let subscriber = Subscriber {
            id: format!("sub-{}", uuid::Uuid::new_v4()),
            name: name.to_string(),
            topic_pattern: topic_pattern.to_string(),
            handler,
            filter,
            state: SubscriberState::Active,
            events_received: 0,
            events_failed: 0,
        };
        let info = subscriber.info();
        subscribers.insert(subscriber.id.clone(), subscriber);

        tracing::info!(
            subscriber = %info.subscriber_id,
            name = %info.name,
            pattern = %info.topic_pattern,
            "Subscriber registered"
        );
        Ok(info)
    }

    /// Remove a subscriber from the bus
    ///
    /// Removal is the terminal transition; the id never delivers again.
    /// Returns false for unknown ids.
    pub fn unsubscribe(&self, subscriber_id: &str) -> Result<bool> {
        let mut subscribers = self
            .subscribers
            .write()
            .map_err(|e| EventError::Lock(format!("Subscriber table lock poisoned: {}", e)))?;

        match subscribers.remove(subscriber_id) {
            Some(mut subscriber) => {
                subscriber.state = SubscriberState::Stopped;
                tracing::info!(
                    subscriber = %subscriber.id,
                    name = %subscriber.name,
                    "Subscriber removed"
                );
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Pause deliveries to a subscriber, keeping its registration
    pub fn pause_subscriber(&self, subscriber_id: &str) -> Result<bool> {
        self.set_state(subscriber_id, SubscriberState::Paused)
    }

    /// Resume deliveries to a paused subscriber
    pub fn resume_subscriber(&self, subscriber_id: &str) -> Result<bool> {
        self.set_state(subscriber_id, SubscriberState::Active)
    }

    fn set_state(&self, subscriber_id: &str, state: SubscriberState) -> Result<bool> {
        let mut subscribers = self
            .subscribers
            .write()
            .map_err(|e| EventError::Lock(format!("Subscriber table lock poisoned: {}", e)))?;

        match subscribers.get_mut(subscriber_id) {
            Some(subscriber) => {
                subscriber.state = state;
                tracing::debug!(subscriber = %subscriber_id, state = ?state, "Subscriber state changed");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Publish an event to a topic
    ///
    /// Walks matching active subscribers in an unspecified order and
    /// returns one delivery record per attempted subscriber. Events that
    /// match no one succeed with an empty result.
    pub fn publish(&self, topic: &str, event: &EventEnvelope) -> Result<Vec<DeliveryRecord>> {
        // Snapshot the eligible set so handlers run without the table lock
        let candidates: Vec<(String, Option<Arc<dyn EventHandler>>, Option<EventFilter>)> = {
            let subscribers = self
                .subscribers
                .read()
                .map_err(|e| EventError::Lock(format!("Subscriber table lock poisoned: {}", e)))?;
            subscribers
                .values()
                .filter(|s| {
                    s.state == SubscriberState::Active && pattern_matches(&s.topic_pattern, topic)
                })
                .map(|s| (s.id.clone(), s.handler.clone(), s.filter.clone()))
                .collect()
        };

        let max_attempts = self.config.max_retry_attempts.max(1);
        let mut records = Vec::with_capacity(candidates.len());
        let mut dead = Vec::new();

        for (subscriber_id, handler, filter) in candidates {
            if !passes_filter(filter.as_ref(), event) {
                continue;
            }

            let mut record = DeliveryRecord {
                event_id: event.event_id.clone(),
                subscriber_id: subscriber_id.clone(),
                status: DeliveryStatus::Pending,
                attempts: 0,
                last_error: None,
                delivered_at: None,
            };

            for _ in 0..max_attempts {
                record.attempts += 1;
                let outcome = match &handler {
                    Some(h) => h.handle(event),
                    None => Ok(()),
                };
                match outcome {
                    Ok(()) => {
                        record.status = DeliveryStatus::Delivered;
                        record.last_error = None;
                        record.delivered_at = Some(Utc::now());
                        break;
                    }
                    Err(e) => {
                        record.last_error = Some(e.to_string());
                    }
                }
            }

            if record.status != DeliveryStatus::Delivered {
                if self.config.dead_letter_enabled {
                    record.status = DeliveryStatus::DeadLetter;
                    dead.push(DeadLetter {
                        topic: topic.to_string(),
                        event: event.clone(),
                        subscriber_id: subscriber_id.clone(),
                        attempts: record.attempts,
                        last_error: record.last_error.clone().unwrap_or_default(),
                        dead_lettered_at: Utc::now(),
                    });
                    tracing::warn!(
                        event_id = %event.event_id,
                        subscriber = %subscriber_id,
                        attempts = record.attempts,
                        "Event dead-lettered"
                    );
                } else {
                    record.status = DeliveryStatus::Failed;
                    tracing::warn!(
                        event_id = %event.event_id,
                        subscriber = %subscriber_id,
                        attempts = record.attempts,
                        "Delivery failed"
                    );
                }
            }

            records.push(record);
        }

        // Fold the outcomes back into the shared structures, one lock at a time
        {
            let mut subscribers = self
                .subscribers
                .write()
                .map_err(|e| EventError::Lock(format!("Subscriber table lock poisoned: {}", e)))?;
            for record in &records {
                if let Some(subscriber) = subscribers.get_mut(&record.subscriber_id) {
                    match record.status {
                        DeliveryStatus::Delivered => subscriber.events_received += 1,
                        _ => subscriber.events_failed += 1,
                    }
                }
            }
        }

        {
            let mut log = self
                .delivery_log
                .write()
                .map_err(|e| EventError::Lock(format!("Delivery log lock poisoned: {}", e)))?;
            log.extend(records.iter().cloned());
        }

        if !dead.is_empty() {
            let mut queue = self
                .dead_letters
                .write()
                .map_err(|e| EventError::Lock(format!("Dead letter queue lock poisoned: {}", e)))?;
            queue.extend(dead);
            let cap = self.config.max_dead_letters;
            if cap > 0 && queue.len() > cap {
                let excess = queue.len() - cap;
                queue.drain(..excess);
            }
        }

        {
            let mut counters = self
                .counters
                .lock()
                .map_err(|e| EventError::Lock(format!("Bus counters lock poisoned: {}", e)))?;
            counters.events_published += 1;
            for record in &records {
                match record.status {
                    DeliveryStatus::Delivered => counters.delivered += 1,
                    DeliveryStatus::Failed => counters.failed += 1,
                    DeliveryStatus::DeadLetter => counters.dead_lettered += 1,
                    DeliveryStatus::Pending => {}
                }
            }
        }

        tracing::debug!(
            topic = %topic,
            event_id = %event.event_id,
            deliveries = records.len(),
            "Event published"
        );
        Ok(records)
    }

    /// Get a subscriber's current view
    pub fn get_subscriber(&self, subscriber_id: &str) -> Result<Option<SubscriberInfo>> {
        let subscribers = self
            .subscribers
            .read()
            .map_err(|e| EventError::Lock(format!("Subscriber table lock poisoned: {}", e)))?;
        Ok(subscribers.get(subscriber_id).map(Subscriber::info))
    }

    /// List every registered subscriber
    pub fn list_subscribers(&self) -> Result<Vec<SubscriberInfo>> {
        let subscribers = self
            .subscribers
            .read()
            .map_err(|e| EventError::Lock(format!("Subscriber table lock poisoned: {}", e)))?;
        Ok(subscribers.values().map(Subscriber::info).collect())
    }

    /// Get dead letters, most recent first
    pub fn get_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetter>> {
        let queue = self
            .dead_letters
            .read()
            .map_err(|e| EventError::Lock(format!("Dead letter queue lock poisoned: {}", e)))?;
        Ok(queue.iter().rev().take(limit).cloned().collect())
    }

    /// Drop all dead letters, returning how many were dropped
    pub fn clear_dead_letters(&self) -> Result<usize> {
        let mut queue = self
            .dead_letters
            .write()
            .map_err(|e| EventError::Lock(format!("Dead letter queue lock poisoned: {}", e)))?;
        let dropped = queue.len();
        queue.clear();
        if dropped > 0 {
            tracing::info!(dropped, "Dead letter queue cleared");
        }
        Ok(dropped)
    }

    /// Query the delivery log, most recent first
    ///
    /// Both filters are optional and combine conjunctively.
    pub fn get_delivery_log(
        &self,
        event_id: Option<&str>,
        subscriber_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<DeliveryRecord>> {
        let log = self
            .delivery_log
            .read()
            .map_err(|e| EventError::Lock(format!("Delivery log lock poisoned: {}", e)))?;
        Ok(log
            .iter()
            .rev()
            .filter(|r| event_id.map_or(true, |id| r.event_id == id))
            .filter(|r| subscriber_id.map_or(true, |id| r.subscriber_id == id))
            .take(limit)
            .cloned()
            .collect())
    }

    /// Get aggregated bus statistics
    pub fn get_statistics(&self) -> Result<BusStatistics> {
        let (subscribers, active, paused) = {
            let table = self
                .subscribers
                .read()
                .map_err(|e| EventError::Lock(format!("Subscriber table lock poisoned: {}", e)))?;
            let active = table
                .values()
                .filter(|s| s.state == SubscriberState::Active)
                .count();
            let paused = table
                .values()
                .filter(|s| s.state == SubscriberState::Paused)
                .count();
            (table.len(), active, paused)
        };

        let delivery_log_size = self
            .delivery_log
            .read()
            .map_err(|e| EventError::Lock(format!("Delivery log lock poisoned: {}", e)))?
            .len();
        let dead_letter_queue_size = self
            .dead_letters
            .read()
            .map_err(|e| EventError::Lock(format!("Dead letter queue lock poisoned: {}", e)))?
            .len();

        let counters = self
            .counters
            .lock()
            .map_err(|e| EventError::Lock(format!("Bus counters lock poisoned: {}", e)))?;

        Ok(BusStatistics {
            subscribers,
            active_subscribers: active,
            paused_subscribers: paused,
            events_published: counters.events_published,
            deliveries_succeeded: counters.delivered,
            deliveries_failed: counters.failed,
            events_dead_lettered: counters.dead_lettered,
            delivery_log_size,
            dead_letter_queue_size,
        })
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

fn passes_filter(filter: Option<&EventFilter>, event: &EventEnvelope) -> bool {
    match filter {
        Some(f) => (&**f)(event),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventPriority, FnHandler, HandlerResult, NoopHandler};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_bus() -> EventBus {
        EventBus::new()
    }

    fn order_event() -> EventEnvelope {
        EventEnvelope::new("order.created", "orders", "test", HashMap::new())
            .with_field("symbol", json!("AAPL"))
    }

    /// Handler that counts invocations and fails the first `failures` of them
    struct FlakyHandler {
        calls: AtomicUsize,
        failures: usize,
    }

    impl FlakyHandler {
        fn new(failures: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                failures,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl EventHandler for FlakyHandler {
        fn handle(&self, _event: &EventEnvelope) -> crate::types::HandlerResult {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(format!("transient failure {}", call + 1).into())
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_subscribe_and_publish() {
        let bus = test_bus();
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = counter.clone();
        bus.subscribe(
            "audit",
            "orders.*",
            Arc::new(FnHandler::new(move |_: &EventEnvelope| -> HandlerResult {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })),
        )
        .unwrap();

        let records = bus.publish("orders.created", &order_event()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, DeliveryStatus::Delivered);
        assert_eq!(records[0].attempts, 1);
        assert!(records[0].delivered_at.is_some());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_publish_no_matching_subscribers() {
        let bus = test_bus();
        bus.subscribe("audit", "payments.*", Arc::new(NoopHandler))
            .unwrap();

        let records = bus.publish("orders.created", &order_event()).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_publish_fans_out() {
        let bus = test_bus();
        bus.subscribe("all", "*", Arc::new(NoopHandler)).unwrap();
        bus.subscribe("orders", "orders.*", Arc::new(NoopHandler))
            .unwrap();
        bus.subscribe("payments", "payments.*", Arc::new(NoopHandler))
            .unwrap();

        let records = bus.publish("orders.created", &order_event()).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records
            .iter()
            .all(|r| r.status == DeliveryStatus::Delivered));
    }

    #[test]
    fn test_retry_until_success() {
        let bus = EventBus::with_config(BusConfig {
            max_retry_attempts: 3,
            ..BusConfig::default()
        });
        let handler = Arc::new(FlakyHandler::new(2));
        bus.subscribe("flaky", "orders.*", handler.clone()).unwrap();

        let records = bus.publish("orders.created", &order_event()).unwrap();
        assert_eq!(records[0].status, DeliveryStatus::Delivered);
        assert_eq!(records[0].attempts, 3);
        assert!(records[0].last_error.is_none());
        assert_eq!(handler.calls(), 3);
    }

    #[test]
    fn test_exhausted_retries_dead_letter() {
        let bus = test_bus();
        let handler = Arc::new(FlakyHandler::new(usize::MAX));
        bus.subscribe("broken", "orders.*", handler.clone()).unwrap();

        let records = bus.publish("orders.created", &order_event()).unwrap();
        assert_eq!(records[0].status, DeliveryStatus::DeadLetter);
        assert_eq!(records[0].attempts, 3);
        assert_eq!(handler.calls(), 3);

        let dead = bus.get_dead_letters(10).unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].topic, "orders.created");
        assert_eq!(dead[0].attempts, 3);
        assert!(dead[0].last_error.contains("transient failure 3"));
    }

    #[test]
    fn test_exhausted_retries_without_dead_lettering() {
        let bus = EventBus::with_config(BusConfig {
            dead_letter_enabled: false,
            ..BusConfig::default()
        });
        bus.subscribe(
            "broken",
            "orders.*",
            Arc::new(FnHandler::new(|_: &EventEnvelope| -> HandlerResult {
                Err("permanent".into())
            })),
        )
        .unwrap();

        let records = bus.publish("orders.created", &order_event()).unwrap();
        assert_eq!(records[0].status, DeliveryStatus::Failed);
        assert_eq!(records[0].last_error.as_deref(), Some("permanent"));
        assert!(bus.get_dead_letters(10).unwrap().is_empty());
    }

    #[test]
    fn test_failing_subscriber_does_not_block_others() {
        let bus = test_bus();
        bus.subscribe(
            "broken",
            "orders.*",
            Arc::new(FnHandler::new(|_: &EventEnvelope| -> HandlerResult {
                Err("boom".into())
            })),
        )
        .unwrap();
        let healthy = bus.subscribe("healthy", "orders.*", Arc::new(NoopHandler)).unwrap();

        let records = bus.publish("orders.created", &order_event()).unwrap();
        assert_eq!(records.len(), 2);
        let ok = records
            .iter()
            .find(|r| r.subscriber_id == healthy.subscriber_id)
            .unwrap();
        assert_eq!(ok.status, DeliveryStatus::Delivered);
    }

    #[test]
    fn test_filter_skips_without_record() {
        let bus = test_bus();
        let filter: EventFilter =
            Arc::new(|event: &EventEnvelope| event.priority == EventPriority::Critical);
        bus.subscribe_with_filter("critical-only", "orders.*", Arc::new(NoopHandler), filter)
            .unwrap();

        let records = bus.publish("orders.created", &order_event()).unwrap();
        assert!(records.is_empty());
        assert_eq!(bus.get_delivery_log(None, None, 10).unwrap().len(), 0);

        let critical = order_event().with_priority(EventPriority::Critical);
        let records = bus.publish("orders.created", &critical).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_sink_subscriber_records_delivery() {
        let bus = test_bus();
        let sink = bus.subscribe_sink("tap", "*").unwrap();

        let records = bus.publish("orders.created", &order_event()).unwrap();
        assert_eq!(records[0].status, DeliveryStatus::Delivered);

        let info = bus.get_subscriber(&sink.subscriber_id).unwrap().unwrap();
        assert_eq!(info.events_received, 1);
    }

    #[test]
    fn test_empty_pattern_rejected() {
        let bus = test_bus();
        assert!(matches!(
            bus.subscribe("bad", "", Arc::new(NoopHandler)),
            Err(EventError::Config(_))
        ));
    }

    #[test]
    fn test_capacity_per_pattern() {
        let bus = EventBus::with_config(BusConfig {
            max_subscribers_per_topic: 2,
            ..BusConfig::default()
        });
        bus.subscribe("a", "orders.*", Arc::new(NoopHandler)).unwrap();
        bus.subscribe("b", "orders.*", Arc::new(NoopHandler)).unwrap();

        let err = bus
            .subscribe("c", "orders.*", Arc::new(NoopHandler))
            .unwrap_err();
        assert!(matches!(err, EventError::Capacity { limit: 2, .. }));

        // A different pattern has its own budget
        assert!(bus.subscribe("c", "payments.*", Arc::new(NoopHandler)).is_ok());
    }

    #[test]
    fn test_capacity_counts_exact_pattern_only() {
        let bus = EventBus::with_config(BusConfig {
            max_subscribers_per_topic: 1,
            ..BusConfig::default()
        });
        bus.subscribe("a", "orders.*", Arc::new(NoopHandler)).unwrap();
        // Overlapping but distinct patterns do not share the budget
        assert!(bus.subscribe("b", "orders.created", Arc::new(NoopHandler)).is_ok());
    }

    #[test]
    fn test_unsubscribe_frees_capacity() {
        let bus = EventBus::with_config(BusConfig {
            max_subscribers_per_topic: 1,
            ..BusConfig::default()
        });
        let first = bus.subscribe("a", "orders.*", Arc::new(NoopHandler)).unwrap();
        assert!(bus.subscribe("b", "orders.*", Arc::new(NoopHandler)).is_err());

        assert!(bus.unsubscribe(&first.subscriber_id).unwrap());
        assert!(bus.subscribe("b", "orders.*", Arc::new(NoopHandler)).is_ok());
    }

    #[test]
    fn test_unsubscribe_unknown() {
        let bus = test_bus();
        assert!(!bus.unsubscribe("sub-missing").unwrap());
    }

    #[test]
    fn test_pause_and_resume() {
        let bus = test_bus();
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = counter.clone();
        let sub = bus
            .subscribe(
                "audit",
                "orders.*",
                Arc::new(FnHandler::new(move |_: &EventEnvelope| -> HandlerResult {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })),
            )
            .unwrap();

        assert!(bus.pause_subscriber(&sub.subscriber_id).unwrap());
        let records = bus.publish("orders.created", &order_event()).unwrap();
        assert!(records.is_empty());
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        assert!(bus.resume_subscriber(&sub.subscriber_id).unwrap());
        let records = bus.publish("orders.created", &order_event()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_pause_unknown_subscriber() {
        let bus = test_bus();
        assert!(!bus.pause_subscriber("sub-missing").unwrap());
        assert!(!bus.resume_subscriber("sub-missing").unwrap());
    }

    #[test]
    fn test_delivery_log_query() {
        let bus = test_bus();
        let first = bus.subscribe("a", "orders.*", Arc::new(NoopHandler)).unwrap();
        bus.subscribe("b", "orders.*", Arc::new(NoopHandler)).unwrap();

        let event = order_event();
        bus.publish("orders.created", &event).unwrap();
        bus.publish("orders.created", &order_event()).unwrap();

        let all = bus.get_delivery_log(None, None, 100).unwrap();
        assert_eq!(all.len(), 4);

        let by_event = bus
            .get_delivery_log(Some(&event.event_id), None, 100)
            .unwrap();
        assert_eq!(by_event.len(), 2);

        let by_both = bus
            .get_delivery_log(Some(&event.event_id), Some(&first.subscriber_id), 100)
            .unwrap();
        assert_eq!(by_both.len(), 1);

        let limited = bus.get_delivery_log(None, None, 3).unwrap();
        assert_eq!(limited.len(), 3);
    }

    #[test]
    fn test_dead_letter_queue_capped() {
        let bus = EventBus::with_config(BusConfig {
            max_retry_attempts: 1,
            max_dead_letters: 2,
            ..BusConfig::default()
        });
        bus.subscribe(
            "broken",
            "orders.*",
            Arc::new(FnHandler::new(|_: &EventEnvelope| -> HandlerResult {
                Err("boom".into())
            })),
        )
        .unwrap();

        let mut last_id = String::new();
        for _ in 0..5 {
            let event = order_event();
            last_id = event.event_id.clone();
            bus.publish("orders.created", &event).unwrap();
        }

        let dead = bus.get_dead_letters(10).unwrap();
        assert_eq!(dead.len(), 2);
        // Most recent first, oldest dropped
        assert_eq!(dead[0].event.event_id, last_id);
    }

    #[test]
    fn test_clear_dead_letters() {
        let bus = EventBus::with_config(BusConfig {
            max_retry_attempts: 1,
            ..BusConfig::default()
        });
        bus.subscribe(
            "broken",
            "orders.*",
            Arc::new(FnHandler::new(|_: &EventEnvelope| -> HandlerResult {
                Err("boom".into())
            })),
        )
        .unwrap();
        bus.publish("orders.created", &order_event()).unwrap();

        assert_eq!(bus.clear_dead_letters().unwrap(), 1);
        assert!(bus.get_dead_letters(10).unwrap().is_empty());
        assert_eq!(bus.clear_dead_letters().unwrap(), 0);
    }

    #[test]
    fn test_subscriber_counters() {
        let bus = EventBus::with_config(BusConfig {
            max_retry_attempts: 1,
            ..BusConfig::default()
        });
        let handler = Arc::new(FlakyHandler::new(1));
        let sub = bus.subscribe("flaky", "orders.*", handler).unwrap();

        bus.publish("orders.created", &order_event()).unwrap(); // fails
        bus.publish("orders.created", &order_event()).unwrap(); // succeeds

        let info = bus.get_subscriber(&sub.subscriber_id).unwrap().unwrap();
        assert_eq!(info.events_received, 1);
        assert_eq!(info.events_failed, 1);
    }

    #[test]
    fn test_statistics() {
        let bus = EventBus::with_config(BusConfig {
            max_retry_attempts: 1,
            ..BusConfig::default()
        });
        bus.subscribe("ok", "orders.*", Arc::new(NoopHandler)).unwrap();
        bus.subscribe(
            "broken",
            "orders.*",
            Arc::new(FnHandler::new(|_: &EventEnvelope| -> HandlerResult {
                Err("boom".into())
            })),
        )
        .unwrap();
        let paused = bus.subscribe("idle", "payments.*", Arc::new(NoopHandler)).unwrap();
        bus.pause_subscriber(&paused.subscriber_id).unwrap();

        bus.publish("orders.created", &order_event()).unwrap();

        let stats = bus.get_statistics().unwrap();
        assert_eq!(stats.subscribers, 3);
        assert_eq!(stats.active_subscribers, 2);
        assert_eq!(stats.paused_subscribers, 1);
        assert_eq!(stats.events_published, 1);
        assert_eq!(stats.deliveries_succeeded, 1);
        assert_eq!(stats.deliveries_failed, 0);
        assert_eq!(stats.events_dead_lettered, 1);
        assert_eq!(stats.delivery_log_size, 2);
        assert_eq!(stats.dead_letter_queue_size, 1);
    }

    #[test]
    fn test_reentrant_publish_from_handler() {
        let bus = Arc::new(test_bus());
        let inner = bus.clone();
        bus.subscribe(
            "chain",
            "orders.created",
            Arc::new(FnHandler::new(move |event: &EventEnvelope| -> HandlerResult {
                let followup = EventEnvelope::new("order.audited", "audit", "chain", HashMap::new())
                    .with_causation(event.event_id.clone());
                inner.publish("audit.order", &followup)?;
                Ok(())
            })),
        )
        .unwrap();
        bus.subscribe_sink("tap", "audit.*").unwrap();

        let records = bus.publish("orders.created", &order_event()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, DeliveryStatus::Delivered);
        assert_eq!(bus.get_statistics().unwrap().events_published, 2);
    }

    #[test]
    fn test_list_subscribers() {
        let bus = test_bus();
        bus.subscribe("a", "orders.*", Arc::new(NoopHandler)).unwrap();
        bus.subscribe_sink("b", "*").unwrap();

        let infos = bus.list_subscribers().unwrap();
        assert_eq!(infos.len(), 2);
        assert!(infos.iter().all(|i| i.state == SubscriberState::Active));
    }
}
