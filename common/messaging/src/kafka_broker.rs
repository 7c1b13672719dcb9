use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::consumer::{Consumer, ConsumerContext, Rebalance, StreamConsumer};
use rdkafka::error::KafkaResult;
use rdkafka::message::{Headers, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::{ClientConfig, ClientContext, TopicPartitionList};
use tracing::{info, warn};

use crate::broker::{ConsumerRecord, DeliveryReport, MessageBroker, PartitionQueue};
use crate::error::{MessagingError, MessagingResult};

/// Logs rebalance events the same way `audit-consumer` logs consumer
/// errors: visibly, but without failing the process.
struct LoggingContext;

impl ClientContext for LoggingContext {}

impl ConsumerContext for LoggingContext {
    fn pre_rebalance(&self, rebalance: &Rebalance) {
        info!(?rebalance, "kafka consumer group rebalancing");
    }
}

type LoggingConsumer = StreamConsumer<LoggingContext>;

/// Real broker, backed by `rdkafka`'s `FutureProducer` for produce and a
/// `StreamConsumer` per [`KafkaBroker::subscribe`] call for consume,
/// grounded in the same client construction `audit-consumer`'s `main.rs`
/// uses for its single-topic consumer.
pub struct KafkaBroker {
    producer: FutureProducer,
    bootstrap_servers: String,
    produce_timeout: Duration,
}

impl KafkaBroker {
    pub fn new(bootstrap_servers: impl Into<String>, produce_timeout: Duration) -> KafkaResult<Self> {
        let bootstrap_servers = bootstrap_servers.into();
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &bootstrap_servers)
            .set("message.timeout.ms", &produce_timeout.as_millis().to_string())
            .create()?;
        Ok(Self {
            producer,
            bootstrap_servers,
            produce_timeout,
        })
    }
}

#[async_trait]
impl MessageBroker for KafkaBroker {
    async fn produce(
        &self,
        topic: &str,
        key: Option<&str>,
        payload: Vec<u8>,
        headers: HashMap<String, String>,
    ) -> MessagingResult<DeliveryReport> {
        let mut owned_headers = OwnedHeaders::new();
        for (name, value) in &headers {
            owned_headers = owned_headers.insert(rdkafka::message::Header {
                key: name.as_str(),
                value: Some(value.as_str()),
            });
        }

        let mut record = FutureRecord::to(topic).payload(&payload).headers(owned_headers);
        if let Some(key) = key {
            record = record.key(key);
        }

        match self.producer.send(record, self.produce_timeout).await {
            Ok((partition, offset)) => Ok(DeliveryReport { partition, offset }),
            Err((err, _)) => Err(MessagingError::Produce {
                topic: topic.to_string(),
                reason: err.to_string(),
            }),
        }
    }

    async fn subscribe(
        &self,
        topics: &[String],
        group: &str,
    ) -> MessagingResult<Vec<Box<dyn PartitionQueue>>> {
        let consumer: LoggingConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.bootstrap_servers)
            .set("group.id", group)
            .set("enable.auto.commit", "false")
            .set("enable.partition.eof", "false")
            .create_with_context(LoggingContext)
            .map_err(|err| MessagingError::Unavailable(err.to_string()))?;

        let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
        consumer
            .subscribe(&topic_refs)
            .map_err(|err| MessagingError::Unavailable(err.to_string()))?;

        // rdkafka assigns partitions asynchronously on the first poll; a
        // fixed settle window mirrors the join-group wait every Kafka
        // client performs before partition ownership is known.
        tokio::time::sleep(Duration::from_millis(200)).await;
        let assignment: TopicPartitionList = consumer
            .assignment()
            .map_err(|err| MessagingError::Unavailable(err.to_string()))?;

        if assignment.count() == 0 {
            warn!(?topics, group, "no partitions assigned after subscribe");
            return Err(MessagingError::NoPartitionsAssigned(topics.to_vec(), group.to_string()));
        }

        let mut queues: Vec<Box<dyn PartitionQueue>> = Vec::new();
        for element in assignment.elements() {
            let (topic, partition) = (element.topic().to_string(), element.partition());
            let split = consumer
                .split_partition_queue(&topic, partition)
                .ok_or_else(|| MessagingError::Unavailable(format!("no queue for {topic}:{partition}")))?;
            queues.push(Box::new(KafkaPartitionQueue {
                topic,
                partition,
                queue: split,
                main: consumer.clone(),
            }));
        }
        Ok(queues)
    }
}

struct KafkaPartitionQueue {
    topic: String,
    partition: i32,
    queue: rdkafka::consumer::StreamPartitionQueue<LoggingContext>,
    main: LoggingConsumer,
}

#[async_trait]
impl PartitionQueue for KafkaPartitionQueue {
    async fn next(&self) -> Option<ConsumerRecord> {
        loop {
            match self.queue.recv().await {
                Ok(message) => {
                    let mut headers = HashMap::new();
                    if let Some(h) = message.headers() {
                        for header in h.iter() {
                            if let Some(value) = header.value {
                                if let Ok(value) = std::str::from_utf8(value) {
                                    headers.insert(header.key.to_string(), value.to_string());
                                }
                            }
                        }
                    }
                    let payload = message.payload().unwrap_or_default().to_vec();
                    let key = message
                        .key()
                        .and_then(|k| std::str::from_utf8(k).ok())
                        .map(|s| s.to_string());
                    return Some(ConsumerRecord {
                        topic: self.topic.clone(),
                        partition: self.partition,
                        offset: message.offset(),
                        key,
                        payload,
                        headers,
                    });
                }
                Err(err) => {
                    warn!(topic = %self.topic, partition = self.partition, error = %err, "kafka partition queue error");
                    continue;
                }
            }
        }
    }

    async fn commit(&self, offset: i64) -> MessagingResult<()> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(&self.topic, self.partition, rdkafka::Offset::Offset(offset + 1))
            .map_err(|err| MessagingError::Unavailable(err.to_string()))?;
        self.main
            .commit(&tpl, rdkafka::consumer::CommitMode::Async)
            .map_err(|err| MessagingError::Unavailable(err.to_string()))
    }

    fn partition(&self) -> i32 {
        self.partition
    }
}
