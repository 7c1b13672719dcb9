use std::collections::HashMap;
use std::sync::Arc;

use common_resilience::RetryPolicy;

use crate::broker::{DeliveryReport, MessageBroker};
use crate::envelope::{EventEnvelope, CORRELATION_ID_HEADER, EVENT_TYPE_HEADER};
use crate::error::{MessagingError, MessagingResult};

/// Publish-side of the event bus (§4.I). Wraps produce calls in a retry
/// policy so transient broker failures (§2 "G → F → I": the classifier
/// feeds the retry executor, which the event bus consumes) are absorbed
/// before surfacing to the caller.
pub struct EventBus<B> {
    broker: Arc<B>,
    source_service: String,
    produce_retry: RetryPolicy<MessagingError>,
}

impl<B: MessageBroker> EventBus<B> {
    pub fn new(broker: Arc<B>, source_service: impl Into<String>, produce_retry: RetryPolicy<MessagingError>) -> Self {
        Self {
            broker,
            source_service: source_service.into(),
            produce_retry,
        }
    }

    /// `publish(topic, key, envelope)` (§4.I, §6). Headers always carry
    /// `correlationId` (generated already by [`EventEnvelope::new`] if the
    /// caller never set one) and the `eventType` discriminator.
    pub async fn publish(
        &self,
        topic: &str,
        key: Option<&str>,
        envelope: EventEnvelope,
    ) -> MessagingResult<DeliveryReport> {
        let mut headers = HashMap::new();
        headers.insert(CORRELATION_ID_HEADER.to_string(), envelope.correlation_id.to_string());
        headers.insert(EVENT_TYPE_HEADER.to_string(), envelope.event_type.clone());

        let payload = serde_json::to_vec(&envelope)
            .map_err(|err| MessagingError::Serialization(err.to_string()))?;

        let broker = self.broker.clone();
        let topic = topic.to_string();
        let key = key.map(|k| k.to_string());

        self.produce_retry
            .execute(|_attempt| {
                let broker = broker.clone();
                let topic = topic.clone();
                let key = key.clone();
                let payload = payload.clone();
                let headers = headers.clone();
                async move { broker.produce(&topic, key.as_deref(), payload, headers).await }
            })
            .await
            .map_err(|err| match err.into_inner() {
                Some(inner) => inner,
                None => MessagingError::Unavailable("produce retries exhausted".to_string()),
            })
    }

    /// Convenience over [`EventBus::publish`] that uses the envelope's own
    /// `aggregate_id` as the partition key (§5: "Event publishes with the
    /// same aggregate id MUST use that id as the partition key to preserve
    /// per-aggregate order").
    pub async fn publish_for_aggregate(&self, topic: &str, envelope: EventEnvelope) -> MessagingResult<DeliveryReport> {
        let key = envelope.aggregate_id.clone();
        self.publish(topic, Some(&key), envelope).await
    }

    pub fn source_service(&self) -> &str {
        &self.source_service
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory::InMemoryBroker;
    use common_resilience::Jitter;
    use std::time::Duration;

    fn retry_policy() -> RetryPolicy<MessagingError> {
        RetryPolicy::builder()
            .max_attempts(3)
            .unwrap()
            .backoff(common_resilience::Backoff::Constant {
                delay: Duration::from_millis(1),
            })
            .jitter(Jitter::None)
            .classify_with(|err: &MessagingError| common_resilience::Classify::error_class(err))
            .build()
    }

    #[tokio::test]
    async fn publish_sets_correlation_and_event_type_headers() {
        let broker = Arc::new(InMemoryBroker::new(1));
        let bus = EventBus::new(broker.clone(), "order-service", retry_policy());
        let envelope = EventEnvelope::new("order.created", "order-1", "order-service", serde_json::json!({}));
        let correlation_id = envelope.correlation_id;

        bus.publish_for_aggregate("orders", envelope).await.unwrap();

        let mut queues = broker.subscribe(&["orders".to_string()], "verify").await.unwrap();
        let queue = queues.remove(0);
        let record = queue.next().await.unwrap();
        assert_eq!(record.headers.get("correlationId"), Some(&correlation_id.to_string()));
        assert_eq!(record.headers.get("eventType"), Some(&"order.created".to_string()));
        assert_eq!(record.key, Some("order-1".to_string()));
    }
}
