//! At-least-once event pipeline shared by every consumer/producer in the
//! fleet (§2 "Messaging core"): per-message retry with classification, a
//! dead-letter queue, and a correlation id carried explicitly across every
//! hop rather than through process-local storage (§9 design note).
//!
//! The broker itself is an abstraction ([`broker::MessageBroker`]) with a
//! `rdkafka`-backed implementation behind the `kafka` feature and an
//! in-memory stand-in used everywhere in this crate's own tests, mirroring
//! how `common-cache` separates its two-tier logic from the concrete
//! Redis client.

pub mod broker;
pub mod config;
pub mod consumer;
pub mod context;
pub mod dlq;
pub mod envelope;
pub mod error;
pub mod event_bus;
pub mod in_memory;
#[cfg(feature = "kafka")]
pub mod kafka_broker;
pub mod retry_context;

pub use broker::{ConsumerRecord, DeliveryReport, MessageBroker, PartitionQueue};
pub use config::{MessagingConfig, RetryConfig};
pub use consumer::{ConsumerGroup, EventHandler};
pub use context::CorrelationContext;
pub use dlq::{DeadLetterSink, DlqStatsSnapshot};
pub use envelope::{EventEnvelope, CORRELATION_ID_HEADER, EVENT_TYPE_HEADER};
pub use error::{MessagingError, MessagingResult};
pub use event_bus::EventBus;
pub use in_memory::InMemoryBroker;
#[cfg(feature = "kafka")]
pub use kafka_broker::KafkaBroker;
pub use retry_context::RetryContext;
