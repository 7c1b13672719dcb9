use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::warn;

use crate::broker::MessageBroker;
use crate::envelope::CORRELATION_ID_HEADER;
use crate::error::MessagingResult;
use crate::retry_context::RetryContext;

/// Per-process totals tracked by the dead-letter sink (§4.H `stats()`).
/// Arrival rate is left to the metrics layer (`common-observability`),
/// which already has a scheduler; these are the raw counters it reads.
#[derive(Debug, Default)]
struct DlqCounters {
    total: AtomicU64,
    reprocessed_ok: AtomicU64,
    reprocessed_failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DlqStatsSnapshot {
    pub total: u64,
    pub reprocessed_ok: u64,
    pub reprocessed_failed: u64,
}

/// Dead-letter sink (§4.H, §3.6). Durability comes from the broker itself:
/// `send` publishes to `<topic><suffix>` (default `.dlq`, §6) which is a
/// broker topic, not a local store, so an entry's presence survives this
/// process restarting (§4.H invariant) as long as the broker does.
pub struct DeadLetterSink<B> {
    broker: Arc<B>,
    topic_suffix: String,
    counters: DlqCounters,
}

impl<B: MessageBroker> DeadLetterSink<B> {
    pub fn new(broker: Arc<B>, topic_suffix: impl Into<String>) -> Self {
        Self {
            broker,
            topic_suffix: topic_suffix.into(),
            counters: DlqCounters::default(),
        }
    }

    pub fn dlq_topic(&self, original_topic: &str) -> String {
        format!("{original_topic}{}", self.topic_suffix)
    }

    /// `send(ctx, payload, terminalError)` (§4.H). Headers match §6's
    /// "Dead-letter topic naming" table exactly.
    pub async fn send(
        &self,
        original_topic: &str,
        ctx: &RetryContext,
        payload: Vec<u8>,
        terminal_error_type: &str,
        terminal_error_message: &str,
    ) -> MessagingResult<()> {
        let mut headers = HashMap::new();
        headers.insert("x-dlq-reason".to_string(), terminal_error_message.to_string());
        headers.insert("x-dlq-attempts".to_string(), ctx.attempt.to_string());
        headers.insert("x-dlq-first-attempt".to_string(), ctx.first_attempt_at.to_rfc3339());
        headers.insert("x-dlq-last-error-type".to_string(), terminal_error_type.to_string());
        headers.insert(CORRELATION_ID_HEADER.to_string(), ctx.correlation_id.to_string());

        let dlq_topic = self.dlq_topic(original_topic);
        self.broker
            .produce(&dlq_topic, Some(&ctx.message_id.to_string()), payload, headers)
            .await?;
        self.counters.total.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn stats(&self) -> DlqStatsSnapshot {
        DlqStatsSnapshot {
            total: self.counters.total.load(Ordering::Relaxed),
            reprocessed_ok: self.counters.reprocessed_ok.load(Ordering::Relaxed),
            reprocessed_failed: self.counters.reprocessed_failed.load(Ordering::Relaxed),
        }
    }

    /// `reprocess(entryId | query)` (§4.H): re-publishes a previously
    /// dead-lettered record back to `original_topic`, decrementing the open
    /// count on success and incrementing the failure count otherwise.
    pub async fn reprocess(
        &self,
        original_topic: &str,
        key: Option<&str>,
        payload: Vec<u8>,
        headers: HashMap<String, String>,
    ) -> MessagingResult<()> {
        match self.broker.produce(original_topic, key, payload, headers).await {
            Ok(_) => {
                self.counters.reprocessed_ok.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(err) => {
                self.counters.reprocessed_failed.fetch_add(1, Ordering::Relaxed);
                warn!(original_topic, error = %err, "dlq reprocess failed");
                Err(err)
            }
        }
    }
}
