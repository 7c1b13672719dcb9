use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Header key every produced record carries the correlation id under
/// (§3.7, §6 "Event bus"). Consumers check this header before falling back
/// to the envelope's own `correlation_id` field.
pub const CORRELATION_ID_HEADER: &str = "correlationId";

/// Header key carrying the outer event-type discriminator (§6: "envelope
/// MUST serialise to a self-describing container ... with an outer
/// `eventType` discriminator").
pub const EVENT_TYPE_HEADER: &str = "eventType";

/// The event envelope (§3.7): what travels on every topic in this fleet.
/// Serialises to a self-describing JSON container with an outer `eventType`
/// discriminator, mirroring the shape `common-audit::AuditEvent` already
/// used for the one event type that crate knew about.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub event_id: Uuid,
    pub event_type: String,
    pub aggregate_id: String,
    pub occurred_at: DateTime<Utc>,
    pub source_service: String,
    /// Set on ingress if missing (§3.7 invariant); see
    /// [`EventEnvelope::new`] and the consumer's correlation-id extraction.
    #[serde(default = "Uuid::new_v4")]
    pub correlation_id: Uuid,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    pub fn new(
        event_type: impl Into<String>,
        aggregate_id: impl Into<String>,
        source_service: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: event_type.into(),
            aggregate_id: aggregate_id.into(),
            occurred_at: Utc::now(),
            source_service: source_service.into(),
            correlation_id: Uuid::new_v4(),
            metadata: HashMap::new(),
            payload,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
