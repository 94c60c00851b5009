//! Engine configuration

use serde::{Deserialize, Serialize};

/// Configuration for the event bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BusConfig {
    /// Delivery attempts per subscriber before the delivery is exhausted
    ///
    /// The first success stops retrying. Treated as at least 1.
    pub max_retry_attempts: u32,

    /// Route exhausted deliveries to the dead letter queue
    ///
    /// When disabled, exhausted deliveries are recorded as failed and the
    /// event is dropped for that subscriber.
    pub dead_letter_enabled: bool,

    /// Maximum registrations per exact topic pattern (0 = unlimited)
    pub max_subscribers_per_topic: usize,

    /// Dead letter queue capacity (0 = unbounded)
    ///
    /// Oldest entries are dropped once the queue grows past this.
    pub max_dead_letters: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts: 3,
            dead_letter_enabled: true,
            max_subscribers_per_topic: 50,
            max_dead_letters: 10_000,
        }
    }
}

/// Configuration for the consumer group layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConsumerConfig {
    /// Batch size cap when `consume` is called without an explicit limit
    pub max_batch_size: usize,

    /// Consume error log capacity (0 = unbounded)
    ///
    /// Oldest entries are dropped once the log grows past this.
    pub max_errors: usize,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 100,
            max_errors: 10_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bus_config_defaults() {
        let config = BusConfig::default();
        assert_eq!(config.max_retry_attempts, 3);
        assert!(config.dead_letter_enabled);
        assert_eq!(config.max_subscribers_per_topic, 50);
        assert_eq!(config.max_dead_letters, 10_000);
    }

    #[test]
    fn test_consumer_config_defaults() {
        let config = ConsumerConfig::default();
        assert_eq!(config.max_batch_size, 100);
        assert_eq!(config.max_errors, 10_000);
    }

    #[test]
    fn test_bus_config_partial_deserialization() {
        // Operators override single knobs; the rest fall back to defaults
        let config: BusConfig =
            serde_json::from_str(r#"{"maxRetryAttempts": 5, "deadLetterEnabled": false}"#)
                .unwrap();
        assert_eq!(config.max_retry_attempts, 5);
        assert!(!config.dead_letter_enabled);
        assert_eq!(config.max_subscribers_per_topic, 50);
    }

    #[test]
    fn test_consumer_config_serialization_roundtrip() {
        let config = ConsumerConfig {
            max_batch_size: 25,
            max_errors: 100,
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"maxBatchSize\":25"));

        let parsed: ConsumerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
