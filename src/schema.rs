//! Versioned schema registry for event payload validation
//!
//! Schemas are keyed by (event_type, version) and describe the payload
//! fields an event of that type carries. Validation is advisory: it
//! produces a report rather than rejecting the event, so callers decide
//! whether to publish anyway.

use crate::error::{EventError, Result};
use crate::types::EventEnvelope;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// Payload schema for one event type at one version
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDefinition {
    /// Unique schema identifier (sch-<uuid>)
    pub schema_id: String,

    /// Event type identifier (e.g., "order.created")
    pub event_type: String,

    /// Schema version
    pub version: u32,

    /// Field names that must be present in the payload
    pub required_fields: Vec<String>,

    /// Field names the payload may carry in addition
    pub optional_fields: Vec<String>,

    /// Optional description of this schema version
    pub description: String,
}

impl SchemaDefinition {
    /// Create a definition with an auto-generated id and no fields
    pub fn new(event_type: impl Into<String>, version: u32) -> Self {
        Self {
            schema_id: format!("sch-{}", uuid::Uuid::new_v4()),
            event_type: event_type.into(),
            version,
            required_fields: Vec::new(),
            optional_fields: Vec::new(),
            description: String::new(),
        }
    }

    /// Set the required field names
    pub fn with_required<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Set the optional field names
    pub fn with_optional<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.optional_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Outcome of validating one event against its registered schema
///
/// An event whose type and version have no registered schema is reported
/// valid with no schema id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    /// True when every required field was present
    pub valid: bool,

    /// Id of the schema the event was checked against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_id: Option<String>,

    /// One entry per missing required field
    pub errors: Vec<String>,
}

/// In-memory schema registry
///
/// Stores definitions in a `HashMap` protected by `RwLock`.
/// Definitions are lost on process restart.
pub struct SchemaRegistry {
    /// (event_type, version) → schema
    schemas: RwLock<HashMap<(String, u32), SchemaDefinition>>,
}

impl SchemaRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            schemas: RwLock::new(HashMap::new()),
        }
    }

    /// Register a schema for an event type
    ///
    /// Versions per event type must be strictly increasing; registering a
    /// version at or below the current latest is rejected. Returns the
    /// stored definition.
    pub fn register(&self, definition: SchemaDefinition) -> Result<SchemaDefinition> {
        if definition.event_type.is_empty() {
            return Err(EventError::Config("Event type cannot be empty".to_string()));
        }
        if definition.version == 0 {
            return Err(EventError::Config("Schema version must be >= 1".to_string()));
        }

        let mut schemas = self
            .schemas
            .write()
            .map_err(|e| EventError::Lock(format!("Schema registry lock poisoned: {}", e)))?;

        let latest = schemas
            .keys()
            .filter(|(t, _)| t == &definition.event_type)
            .map(|(_, v)| *v)
            .max();
        if let Some(latest) = latest {
            if definition.version <= latest {
                return Err(EventError::Config(format!(
                    "Schema version for '{}' must exceed the latest v{}, got v{}",
                    definition.event_type, latest, definition.version
                )));
            }
        }

        let key = (definition.event_type.clone(), definition.version);
        schemas.insert(key, definition.clone());
        tracing::debug!(
            event_type = %definition.event_type,
            version = definition.version,
            "Schema registered"
        );
        Ok(definition)
    }

    /// Get the schema for an event type
    ///
    /// With `version` None, returns the latest registered version.
    pub fn get_schema(
        &self,
        event_type: &str,
        version: Option<u32>,
    ) -> Result<Option<SchemaDefinition>> {
        let schemas = self
            .schemas
            .read()
            .map_err(|e| EventError::Lock(format!("Schema registry lock poisoned: {}", e)))?;

        let version = match version {
            Some(v) => v,
            None => {
                match schemas
                    .keys()
                    .filter(|(t, _)| t == event_type)
                    .map(|(_, v)| *v)
                    .max()
                {
                    Some(v) => v,
                    None => return Ok(None),
                }
            }
        };
        Ok(schemas.get(&(event_type.to_string(), version)).cloned())
    }

    /// Validate an event against the schema registered for it
    ///
    /// Checks the schema keyed by the event's own type and version. Events
    /// with no matching schema are reported valid.
    pub fn validate_event(&self, event: &EventEnvelope) -> Result<ValidationReport> {
        let schemas = self
            .schemas
            .read()
            .map_err(|e| EventError::Lock(format!("Schema registry lock poisoned: {}", e)))?;

        let key = (event.event_type.clone(), event.version);
        let schema = match schemas.get(&key) {
            Some(s) => s,
            None => {
                return Ok(ValidationReport {
                    valid: true,
                    schema_id: None,
                    errors: Vec::new(),
                })
            }
        };

        let errors: Vec<String> = schema
            .required_fields
            .iter()
            .filter(|field| !event.data.contains_key(*field))
            .map(|field| format!("Missing required field '{}'", field))
            .collect();

        if !errors.is_empty() {
            tracing::debug!(
                event_id = %event.event_id,
                event_type = %event.event_type,
                version = event.version,
                missing = errors.len(),
                "Event failed schema validation"
            );
        }

        Ok(ValidationReport {
            valid: errors.is_empty(),
            schema_id: Some(schema.schema_id.clone()),
            errors,
        })
    }

    /// Check whether events written under an old version remain readable
    /// under a new version
    ///
    /// Compatible means every required field of the old version is still
    /// known to the new version, as required or optional. Returns false
    /// when either version is unregistered.
    pub fn is_compatible(
        &self,
        event_type: &str,
        old_version: u32,
        new_version: u32,
    ) -> Result<bool> {
        let schemas = self
            .schemas
            .read()
            .map_err(|e| EventError::Lock(format!("Schema registry lock poisoned: {}", e)))?;

        let old = match schemas.get(&(event_type.to_string(), old_version)) {
            Some(s) => s,
            None => return Ok(false),
        };
        let new = match schemas.get(&(event_type.to_string(), new_version)) {
            Some(s) => s,
            None => return Ok(false),
        };

        let compatible = old.required_fields.iter().all(|field| {
            new.required_fields.contains(field) || new.optional_fields.contains(field)
        });
        Ok(compatible)
    }

    /// List the latest schema of every registered event type, sorted by type
    pub fn list_schemas(&self) -> Result<Vec<SchemaDefinition>> {
        let schemas = self
            .schemas
            .read()
            .map_err(|e| EventError::Lock(format!("Schema registry lock poisoned: {}", e)))?;

        let mut latest: HashMap<&str, &SchemaDefinition> = HashMap::new();
        for ((event_type, _), schema) in schemas.iter() {
            match latest.get(event_type.as_str()) {
                Some(current) if current.version >= schema.version => {}
                _ => {
                    latest.insert(event_type, schema);
                }
            }
        }

        let mut result: Vec<SchemaDefinition> = latest.values().map(|s| (*s).clone()).collect();
        result.sort_by(|a, b| a.event_type.cmp(&b.event_type));
        Ok(result)
    }

    /// List all registered versions of an event type in ascending order
    pub fn get_versions(&self, event_type: &str) -> Result<Vec<u32>> {
        let schemas = self
            .schemas
            .read()
            .map_err(|e| EventError::Lock(format!("Schema registry lock poisoned: {}", e)))?;

        let mut versions: Vec<u32> = schemas
            .keys()
            .filter(|(t, _)| t == event_type)
            .map(|(_, v)| *v)
            .collect();
        versions.sort_unstable();
        Ok(versions)
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}
