use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Per-message retry bookkeeping (§3.4). One of these is built when a
/// record is first delivered and carried through every retry attempt; it
/// is never retried itself past `policy.max_attempts` — once exhausted the
/// dispatcher hands it to the dead-letter sink and discards it.
#[derive(Debug, Clone)]
pub struct RetryContext {
    pub message_id: Uuid,
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub first_attempt_at: DateTime<Utc>,
    pub last_attempt_at: DateTime<Utc>,
    /// 1-based; matches the attempt number the executor is about to make.
    pub attempt: usize,
    pub correlation_id: Uuid,
}

impl RetryContext {
    pub fn new(message_id: Uuid, topic: impl Into<String>, partition: i32, offset: i64, correlation_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            message_id,
            topic: topic.into(),
            partition,
            offset,
            first_attempt_at: now,
            last_attempt_at: now,
            attempt: 0,
            correlation_id,
        }
    }

    pub fn record_attempt(&mut self, attempt_index: usize) {
        self.attempt = attempt_index + 1;
        self.last_attempt_at = Utc::now();
    }
}
