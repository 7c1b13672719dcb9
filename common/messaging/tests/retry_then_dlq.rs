use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common_messaging::{
    ConsumerGroup, CorrelationContext, DeadLetterSink, EventEnvelope, EventHandler, InMemoryBroker, MessageBroker,
};
use common_resilience::{Backoff, Classify, ErrorClass, Jitter, RetryPolicy, Sleeper};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error, Clone)]
enum OrderHandlerError {
    #[error("timeout contacting downstream")]
    Timeout,
    #[error("payload failed validation")]
    Validation,
}

impl Classify for OrderHandlerError {
    fn error_class(&self) -> ErrorClass {
        match self {
            OrderHandlerError::Timeout => ErrorClass::Transient,
            OrderHandlerError::Validation => ErrorClass::Permanent,
        }
    }
}

struct AlwaysFails {
    calls: AtomicUsize,
    error: OrderHandlerError,
}

#[async_trait]
impl EventHandler for AlwaysFails {
    type Error = OrderHandlerError;

    async fn handle(&self, _envelope: &EventEnvelope, _ctx: &CorrelationContext) -> Result<(), Self::Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    fn new() -> Self {
        Self { delays: Mutex::new(Vec::new()) }
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().await.push(duration);
    }
}

/// §8 scenario 3: "a handler throws a timeout 3 times with policy
/// {maxAttempts=3, initialBackoff=1 s, multiplier=2, jitter=0}; waits
/// before attempt 2 = 1 s, before attempt 3 = 2 s, then DLQ entry
/// published to `<topic>.dlq` with `x-dlq-attempts: 3`."
#[tokio::test]
async fn transient_failure_exhausts_then_dlqs_with_expected_backoff() {
    let broker = Arc::new(InMemoryBroker::new(1));
    let envelope = EventEnvelope::new("order.created", "order-1", "order-service", serde_json::json!({"total": 10}));
    broker
        .produce("orders", Some("order-1"), serde_json::to_vec(&envelope).unwrap(), Default::default())
        .await
        .unwrap();

    let sleeper = Arc::new(RecordingSleeper::new());
    let policy: RetryPolicy<OrderHandlerError> = RetryPolicy::builder()
        .max_attempts(3)
        .unwrap()
        .backoff(Backoff::exponential(Duration::from_secs(1), Duration::from_secs(60)))
        .jitter(Jitter::None)
        .classify_with(|err: &OrderHandlerError| err.error_class())
        .sleeper(sleeper.clone())
        .build();

    let handler = Arc::new(AlwaysFails {
        calls: AtomicUsize::new(0),
        error: OrderHandlerError::Timeout,
    });
    let dlq = Arc::new(DeadLetterSink::new(broker.clone(), ".dlq"));

    let mut queues = broker.subscribe(&["orders".to_string()], "order-consumers").await.unwrap();
    let queue = queues.remove(0);

    let group = ConsumerGroup::new(broker.clone(), "order-consumers");
    let _ = group; // constructed to document the real entry point; driven directly below for a bounded test.
    drive_one_record(queue, handler.clone(), policy, dlq.clone()).await;

    assert_eq!(handler.calls.load(Ordering::SeqCst), 3, "policy.maxAttempts == 3");

    let delays = sleeper.delays.lock().await.clone();
    assert_eq!(delays, vec![Duration::from_secs(1), Duration::from_secs(2)]);

    assert_eq!(dlq.stats().total, 1);
    let mut dlq_queues = broker.subscribe(&["orders.dlq".to_string()], "verify").await.unwrap();
    let dlq_record = dlq_queues.remove(0).next().await.unwrap();
    assert_eq!(dlq_record.headers.get("x-dlq-attempts"), Some(&"3".to_string()));
}

/// §8 scenario 4: a `Permanent` error produces exactly one attempt and a
/// DLQ entry with `x-dlq-attempts: 1`.
#[tokio::test]
async fn permanent_failure_produces_exactly_one_attempt() {
    let broker = Arc::new(InMemoryBroker::new(1));
    let envelope = EventEnvelope::new("order.created", "order-1", "order-service", serde_json::json!({}));
    broker
        .produce("orders", Some("order-1"), serde_json::to_vec(&envelope).unwrap(), Default::default())
        .await
        .unwrap();

    let policy: RetryPolicy<OrderHandlerError> = RetryPolicy::builder()
        .max_attempts(3)
        .unwrap()
        .backoff(Backoff::exponential(Duration::from_secs(1), Duration::from_secs(60)))
        .jitter(Jitter::None)
        .classify_with(|err: &OrderHandlerError| err.error_class())
        .build();

    let handler = Arc::new(AlwaysFails {
        calls: AtomicUsize::new(0),
        error: OrderHandlerError::Validation,
    });
    let dlq = Arc::new(DeadLetterSink::new(broker.clone(), ".dlq"));

    let mut queues = broker.subscribe(&["orders".to_string()], "order-consumers").await.unwrap();
    let queue = queues.remove(0);
    drive_one_record(queue, handler.clone(), policy, dlq.clone()).await;

    assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    let mut dlq_queues = broker.subscribe(&["orders.dlq".to_string()], "verify").await.unwrap();
    let dlq_record = dlq_queues.remove(0).next().await.unwrap();
    assert_eq!(dlq_record.headers.get("x-dlq-attempts"), Some(&"1".to_string()));
}

async fn drive_one_record<H>(
    queue: Box<dyn common_messaging::PartitionQueue>,
    handler: Arc<H>,
    policy: RetryPolicy<H::Error>,
    dlq: Arc<DeadLetterSink<InMemoryBroker>>,
) where
    H: EventHandler,
{
    let record = queue.next().await.expect("one record seeded");
    let envelope: EventEnvelope = serde_json::from_slice(&record.payload).unwrap();
    let correlation_id = envelope.correlation_id;
    let ctx = CorrelationContext::new(correlation_id);
    let mut retry_ctx = common_messaging::RetryContext::new(
        envelope.event_id,
        record.topic.clone(),
        record.partition,
        record.offset,
        correlation_id,
    );

    let outcome = policy
        .execute(|attempt| {
            retry_ctx.record_attempt(attempt);
            let handler = handler.clone();
            let envelope = envelope.clone();
            let ctx = ctx.clone();
            async move { handler.handle(&envelope, &ctx).await }
        })
        .await;

    if let Err(err) = outcome {
        let (error_type, message) = match err.into_inner() {
            Some(inner) => ("HandlerError".to_string(), inner.to_string()),
            None => ("Unknown".to_string(), "exhausted".to_string()),
        };
        dlq.send(&record.topic, &retry_ctx, record.payload.clone(), &error_type, &message)
            .await
            .unwrap();
    }
}
