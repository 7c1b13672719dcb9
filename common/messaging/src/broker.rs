use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::MessagingResult;

/// One delivered record, independent of which broker produced it.
#[derive(Debug, Clone)]
pub struct ConsumerRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Vec<u8>,
    pub headers: HashMap<String, String>,
}

/// Acknowledgement of a produce call (§4.I "returns a future that
/// completes when the broker has acknowledged").
#[derive(Debug, Clone, Copy, Default)]
pub struct DeliveryReport {
    pub partition: i32,
    pub offset: i64,
}

/// One assigned partition's ordered record stream (§5 "within one broker
/// partition, messages are dispatched serially"). The dispatcher owns one
/// task per `PartitionQueue`; distinct queues make progress concurrently,
/// the same queue never has two records in flight at once.
#[async_trait]
pub trait PartitionQueue: Send + Sync {
    /// Blocks until the next record is available, or returns `None` once
    /// the partition is permanently drained (consumer shutting down).
    async fn next(&self) -> Option<ConsumerRecord>;

    /// Commits `offset` as fully processed (§4.I "Commit offsets ONLY
    /// after the handler returns successfully OR after the dead-letter
    /// sink has accepted the message").
    async fn commit(&self, offset: i64) -> MessagingResult<()>;

    fn partition(&self) -> i32;
}

/// Abstraction over the message broker, grounded in the same shape
/// `common-cache::RemoteTier` uses to separate the two-tier cache's logic
/// from its concrete Redis client: one trait, a real implementation behind
/// a feature flag, and an in-memory stand-in for tests.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    async fn produce(
        &self,
        topic: &str,
        key: Option<&str>,
        payload: Vec<u8>,
        headers: HashMap<String, String>,
    ) -> MessagingResult<DeliveryReport>;

    /// Subscribes `group` to `topics`, returning one [`PartitionQueue`] per
    /// partition assigned at the time of the call. A later rebalance is not
    /// reflected in queues already handed out.
    async fn subscribe(
        &self,
        topics: &[String],
        group: &str,
    ) -> MessagingResult<Vec<Box<dyn PartitionQueue>>>;
}
