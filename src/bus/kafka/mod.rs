//! Kafka bus implementation.
//!
//! Topics are used as named (`order.paid`, `ship.assembled`). The message key
//! is the event id, so Kafka's partitioner keeps records with the same key
//! in one partition. Consumers disable auto-commit and commit each offset
//! synchronously once the handler succeeded.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::Message as KafkaMessage;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::{ClientConfig, Offset, TopicPartitionList};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    deliver_with_retry, BusError, ConsumerGroup, ConsumerSettings, Delivery, KafkaConfig, Message,
    MessageHandler, Producer, Result,
};

/// Offsets are committed without waiting for the broker.
const COMMIT_MODE: CommitMode = CommitMode::Async;

/// Build a ClientConfig for producers.
fn producer_config(config: &KafkaConfig) -> ClientConfig {
    let mut client = ClientConfig::new();
    client.set("bootstrap.servers", &config.bootstrap_servers);
    client.set("message.timeout.ms", config.message_timeout_ms.to_string());
    client.set("acks", "all");
    client.set("enable.idempotence", "true");

    apply_security_config(config, &mut client);
    client
}

/// Build a ClientConfig for consumers.
fn consumer_config(config: &KafkaConfig, group_id: &str) -> ClientConfig {
    let mut client = ClientConfig::new();
    client.set("bootstrap.servers", &config.bootstrap_servers);
    client.set("group.id", group_id);
    client.set("enable.auto.commit", "false");
    client.set("auto.offset.reset", "earliest");

    apply_security_config(config, &mut client);
    client
}

/// Apply security settings to a ClientConfig.
fn apply_security_config(config: &KafkaConfig, client: &mut ClientConfig) {
    if let Some(ref protocol) = config.security_protocol {
        client.set("security.protocol", protocol);
    }

    if let Some(ref mechanism) = config.sasl_mechanism {
        client.set("sasl.mechanism", mechanism);
    }

    if let Some(ref username) = config.sasl_username {
        client.set("sasl.username", username);
    }

    if let Some(ref password) = config.sasl_password {
        client.set("sasl.password", password);
    }

    if let Some(ref ca_location) = config.ssl_ca_location {
        client.set("ssl.ca.location", ca_location);
    }
}

/// Map a produce error to the bus error kinds callers distinguish.
fn classify_send_error(err: KafkaError) -> BusError {
    match err {
        KafkaError::MessageProduction(RDKafkaErrorCode::MessageTimedOut)
        | KafkaError::MessageProduction(RDKafkaErrorCode::RequestTimedOut)
        | KafkaError::MessageProduction(RDKafkaErrorCode::OperationTimedOut) => {
            BusError::DeadlineExceeded(err.to_string())
        }
        other => BusError::BrokerUnavailable(other.to_string()),
    }
}

// ============================================================================
// Producer
// ============================================================================

/// Synchronous Kafka producer: `send` resolves once the broker acknowledged.
pub struct KafkaProducer {
    producer: FutureProducer,
    timeout: Duration,
}

impl KafkaProducer {
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        let producer: FutureProducer = producer_config(config).create().map_err(|e| {
            BusError::BrokerUnavailable(format!("Failed to create Kafka producer: {}", e))
        })?;

        info!(
            bootstrap_servers = %config.bootstrap_servers,
            "Kafka producer created"
        );

        Ok(Self {
            producer,
            timeout: Duration::from_millis(config.message_timeout_ms),
        })
    }
}

#[async_trait]
impl Producer for KafkaProducer {
    #[tracing::instrument(name = "bus.send", skip_all, fields(topic = %topic))]
    async fn send(&self, topic: &str, key: &[u8], value: &[u8]) -> Result<()> {
        let record = FutureRecord::to(topic).key(key).payload(value);

        let (partition, offset) = self
            .producer
            .send(record, Timeout::After(self.timeout))
            .await
            .map_err(|(e, _)| classify_send_error(e))?;

        debug!(partition, offset, "Published record to Kafka");
        Ok(())
    }
}

// ============================================================================
// Consumer group
// ============================================================================

/// Kafka consumer group.
///
/// Records are handled one at a time, which keeps per-partition FIFO and a
/// single in-flight handler per partition. Partition ownership is left to
/// Kafka's group coordinator.
pub struct KafkaConsumerGroup {
    consumer: StreamConsumer,
    settings: ConsumerSettings,
}

impl KafkaConsumerGroup {
    pub fn new(config: &KafkaConfig, settings: ConsumerSettings) -> Result<Self> {
        let consumer: StreamConsumer = consumer_config(config, &settings.group_id)
            .create()
            .map_err(|e| {
                BusError::BrokerUnavailable(format!("Failed to create Kafka consumer: {}", e))
            })?;

        Ok(Self { consumer, settings })
    }

    /// Queue an offset commit. Never blocks the worker; librdkafka sends it
    /// in the background and a lost commit only causes a redelivery.
    fn commit(&self, message: &Message) -> Result<()> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(
            &message.topic,
            message.partition,
            Offset::Offset(message.offset + 1),
        )
        .map_err(|e| BusError::BrokerUnavailable(format!("Invalid commit offset: {}", e)))?;

        self.consumer
            .commit(&tpl, COMMIT_MODE)
            .map_err(|e| BusError::BrokerUnavailable(format!("Failed to commit offset: {}", e)))
    }
}

#[async_trait]
impl ConsumerGroup for KafkaConsumerGroup {
    async fn run(&self, ctx: CancellationToken, handler: Arc<dyn MessageHandler>) -> Result<()> {
        if self.settings.topics.is_empty() {
            return Err(BusError::Subscribe("no topics configured".to_string()));
        }

        let topic_refs: Vec<&str> = self.settings.topics.iter().map(|s| s.as_str()).collect();
        self.consumer
            .subscribe(&topic_refs)
            .map_err(|e| BusError::Subscribe(format!("Failed to subscribe to topics: {}", e)))?;

        info!(
            group = %self.settings.group_id,
            topics = ?self.settings.topics,
            "Subscribed to Kafka topics"
        );

        loop {
            let received = tokio::select! {
                _ = ctx.cancelled() => break,
                received = self.consumer.recv() => received.map(|m| Message {
                    topic: m.topic().to_string(),
                    partition: m.partition(),
                    offset: m.offset(),
                    key: m.key().map(<[u8]>::to_vec).unwrap_or_default(),
                    value: m.payload().map(<[u8]>::to_vec).unwrap_or_default(),
                }),
            };

            let message = match received {
                Ok(message) => Arc::new(message),
                Err(e) => {
                    error!(group = %self.settings.group_id, error = %e, "Kafka consumer error");
                    continue;
                }
            };

            debug!(
                topic = %message.topic,
                partition = message.partition,
                offset = message.offset,
                "Received record"
            );

            // Records are handled one at a time. A record in retry holds back
            // every partition assigned to this member until it completes.
            match deliver_with_retry(&ctx, &handler, Arc::clone(&message), &self.settings).await {
                Delivery::Completed => {
                    if let Err(e) = self.commit(&message) {
                        // Redelivered after rebalance or restart; handlers are idempotent.
                        warn!(offset = message.offset, error = %e, "Commit failed");
                    }
                }
                Delivery::Abandoned => break,
            }
        }

        self.consumer.unsubscribe();
        info!(group = %self.settings.group_id, "Kafka consumer group stopped");
        Ok(())
    }
}
