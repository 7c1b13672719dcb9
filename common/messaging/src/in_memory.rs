use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex as AsyncMutex;

use crate::broker::{ConsumerRecord, DeliveryReport, MessageBroker, PartitionQueue};
use crate::error::MessagingResult;

struct Partition {
    records: AsyncMutex<tokio::sync::mpsc::UnboundedReceiver<ConsumerRecord>>,
    sender: tokio::sync::mpsc::UnboundedSender<ConsumerRecord>,
    next_offset: AtomicI64,
}

/// In-process stand-in for a Kafka-shaped broker (no feature flag needed),
/// used in tests the same way `common-cache::InMemoryRemoteTier` stands in
/// for Redis. Partitions a topic by hashing the produce key, and preserves
/// per-partition order with an unbounded mpsc channel per partition.
pub struct InMemoryBroker {
    partitions_per_topic: usize,
    topics: DashMap<String, Arc<Vec<Arc<Partition>>>>,
}

impl InMemoryBroker {
    pub fn new(partitions_per_topic: usize) -> Self {
        Self {
            partitions_per_topic: partitions_per_topic.max(1),
            topics: DashMap::new(),
        }
    }

    fn partitions_for(&self, topic: &str) -> Arc<Vec<Arc<Partition>>> {
        if let Some(existing) = self.topics.get(topic) {
            return existing.clone();
        }
        let partitions: Vec<Arc<Partition>> = (0..self.partitions_per_topic)
            .map(|_| {
                let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
                Arc::new(Partition {
                    records: AsyncMutex::new(rx),
                    sender: tx,
                    next_offset: AtomicI64::new(0),
                })
            })
            .collect();
        let partitions = Arc::new(partitions);
        self.topics.insert(topic.to_string(), partitions.clone());
        partitions
    }

    fn partition_index(&self, key: Option<&str>) -> usize {
        match key {
            Some(k) => {
                let mut hasher = DefaultHasher::new();
                k.hash(&mut hasher);
                (hasher.finish() as usize) % self.partitions_per_topic
            }
            None => 0,
        }
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new(4)
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn produce(
        &self,
        topic: &str,
        key: Option<&str>,
        payload: Vec<u8>,
        headers: HashMap<String, String>,
    ) -> MessagingResult<DeliveryReport> {
        let partitions = self.partitions_for(topic);
        let index = self.partition_index(key);
        let partition = &partitions[index];
        let offset = partition.next_offset.fetch_add(1, Ordering::SeqCst);
        let record = ConsumerRecord {
            topic: topic.to_string(),
            partition: index as i32,
            offset,
            key: key.map(|s| s.to_string()),
            payload,
            headers,
        };
        // A closed receiver (all queues dropped) means nobody is consuming;
        // still report success since the broker itself accepted the write.
        let _ = partition.sender.send(record);
        Ok(DeliveryReport {
            partition: index as i32,
            offset,
        })
    }

    async fn subscribe(
        &self,
        topics: &[String],
        _group: &str,
    ) -> MessagingResult<Vec<Box<dyn PartitionQueue>>> {
        let mut queues: Vec<Box<dyn PartitionQueue>> = Vec::new();
        for topic in topics {
            let partitions = self.partitions_for(topic);
            for (index, partition) in partitions.iter().enumerate() {
                queues.push(Box::new(InMemoryPartitionQueue {
                    topic: topic.clone(),
                    index: index as i32,
                    partition: partition.clone(),
                }));
            }
        }
        Ok(queues)
    }
}

struct InMemoryPartitionQueue {
    topic: String,
    index: i32,
    partition: Arc<Partition>,
}

#[async_trait]
impl PartitionQueue for InMemoryPartitionQueue {
    async fn next(&self) -> Option<ConsumerRecord> {
        self.partition.records.lock().await.recv().await
    }

    async fn commit(&self, _offset: i64) -> MessagingResult<()> {
        // No-op: the in-memory broker has no durable offset store: it
        // exists only to exercise dispatch and retry/DLQ logic in tests.
        let _ = &self.topic;
        Ok(())
    }

    fn partition(&self) -> i32 {
        self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_key_always_lands_on_the_same_partition() {
        let broker = InMemoryBroker::new(8);
        let a = broker
            .produce("orders", Some("order-1"), b"a".to_vec(), HashMap::new())
            .await
            .unwrap();
        let b = broker
            .produce("orders", Some("order-1"), b"b".to_vec(), HashMap::new())
            .await
            .unwrap();
        assert_eq!(a.partition, b.partition);
        assert_eq!(b.offset, a.offset + 1);
    }

    #[tokio::test]
    async fn subscribe_delivers_produced_records_in_order() {
        let broker = InMemoryBroker::new(1);
        broker
            .produce("orders", Some("order-1"), b"first".to_vec(), HashMap::new())
            .await
            .unwrap();
        broker
            .produce("orders", Some("order-1"), b"second".to_vec(), HashMap::new())
            .await
            .unwrap();

        let mut queues = broker.subscribe(&["orders".to_string()], "group-a").await.unwrap();
        let queue = queues.remove(0);
        let first = queue.next().await.unwrap();
        let second = queue.next().await.unwrap();
        assert_eq!(first.payload, b"first");
        assert_eq!(second.payload, b"second");
    }
}
