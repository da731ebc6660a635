//! Partitioned message bus.
//!
//! This module contains:
//! - `Producer` trait: keyed, synchronous send to a topic
//! - `ConsumerGroup` trait: at-least-once delivery to a `MessageHandler`
//! - Bus configuration types and the `init_message_bus` factory
//! - Implementations: in-process channel broker, Kafka, Mock
//!
//! Delivery contract shared by every consumer group:
//! - an offset is committed only after the handler returns `Ok`
//! - one handler in flight per partition, FIFO within a partition
//! - a failed delivery is retried with backoff until it succeeds or the
//!   consumer shuts down
//! - on shutdown no new message is started; in-flight handlers get
//!   `shutdown_timeout` to finish before their own token is cancelled

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backon::BackoffBuilder;
use futures::future::BoxFuture;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::utils::retry::redelivery_backoff;

// Implementation modules
pub mod channel;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod mock;

// Re-exports
pub use channel::{ChannelBroker, ChannelConsumerGroup};
#[cfg(feature = "kafka")]
pub use kafka::{KafkaConsumerGroup, KafkaProducer};
pub use mock::MockProducer;

// ============================================================================
// Traits
// ============================================================================

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur during bus operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BusError {
    #[error("Broker unavailable: {0}")]
    BrokerUnavailable(String),

    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    #[error("Handler failed: {0}")]
    Handler(String),

    #[error("Delivery cancelled")]
    Cancelled,
}

/// A record read from a topic partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// Handler for messages delivered by a consumer group.
///
/// `ctx` is the delivery's own token. It is cancelled only when the consumer
/// gives up waiting for this delivery during shutdown; long waits inside the
/// handler should race it.
pub trait MessageHandler: Send + Sync {
    fn handle(
        &self,
        ctx: CancellationToken,
        message: Arc<Message>,
    ) -> BoxFuture<'static, std::result::Result<(), BusError>>;
}

/// Keyed, synchronous publisher.
///
/// Messages with the same key land on the same partition and are therefore
/// delivered in send order. No deduplication is performed.
#[async_trait]
pub trait Producer: Send + Sync {
    async fn send(&self, topic: &str, key: &[u8], value: &[u8]) -> Result<()>;
}

/// Subscription of a named group to one or more topics.
#[async_trait]
pub trait ConsumerGroup: Send + Sync {
    /// Consume until `ctx` is cancelled and in-flight deliveries are settled.
    async fn run(&self, ctx: CancellationToken, handler: Arc<dyn MessageHandler>) -> Result<()>;
}

/// Per-subscription consumer settings.
#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub group_id: String,
    pub topics: Vec<String>,
    /// How long in-flight deliveries may run after shutdown begins.
    pub shutdown_timeout: Duration,
    pub retry_min_delay: Duration,
    pub retry_max_delay: Duration,
}

impl ConsumerSettings {
    pub fn new(group_id: impl Into<String>, topics: Vec<String>) -> Self {
        Self {
            group_id: group_id.into(),
            topics,
            shutdown_timeout: Duration::from_secs(15),
            retry_min_delay: Duration::from_millis(100),
            retry_max_delay: Duration::from_secs(10),
        }
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn with_retry_delays(mut self, min: Duration, max: Duration) -> Self {
        self.retry_min_delay = min;
        self.retry_max_delay = max;
        self
    }
}

/// How a delivery ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    /// Handler succeeded; the offset may be committed.
    Completed,
    /// Shutdown interrupted the delivery; the offset must not be committed.
    Abandoned,
}

/// Deliver one message, retrying on error, honoring shutdown.
pub(crate) async fn deliver_with_retry(
    ctx: &CancellationToken,
    handler: &Arc<dyn MessageHandler>,
    message: Arc<Message>,
    settings: &ConsumerSettings,
) -> Delivery {
    let abort = CancellationToken::new();

    let attempts = async {
        let mut delays =
            redelivery_backoff(settings.retry_min_delay, settings.retry_max_delay).build();
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match handler.handle(abort.clone(), Arc::clone(&message)).await {
                Ok(()) => return Delivery::Completed,
                Err(e) => {
                    if ctx.is_cancelled() || abort.is_cancelled() {
                        warn!(
                            topic = %message.topic,
                            partition = message.partition,
                            offset = message.offset,
                            error = %e,
                            "Delivery failed during shutdown, leaving uncommitted"
                        );
                        return Delivery::Abandoned;
                    }
                    let delay = delays.next().unwrap_or(settings.retry_max_delay);
                    warn!(
                        topic = %message.topic,
                        partition = message.partition,
                        offset = message.offset,
                        attempt,
                        error = %e,
                        delay = ?delay,
                        "Handler failed, retrying"
                    );
                    tokio::select! {
                        _ = ctx.cancelled() => return Delivery::Abandoned,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    };
    tokio::pin!(attempts);

    tokio::select! {
        outcome = &mut attempts => outcome,
        _ = ctx.cancelled() => {
            let deadline = tokio::time::Instant::now() + settings.shutdown_timeout;
            debug!(
                topic = %message.topic,
                offset = message.offset,
                timeout = ?settings.shutdown_timeout,
                "Shutdown requested, waiting for in-flight delivery"
            );
            match tokio::time::timeout_at(deadline, &mut attempts).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(
                        topic = %message.topic,
                        partition = message.partition,
                        offset = message.offset,
                        "Shutdown deadline exceeded, aborting handler"
                    );
                    abort.cancel();
                    // The deadline has passed, so this polls once: a handler that
                    // watches its token unwinds, anything else is dropped.
                    tokio::time::timeout_at(deadline, &mut attempts)
                        .await
                        .unwrap_or(Delivery::Abandoned)
                }
            }
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Messaging type discriminator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessagingType {
    /// In-process partitioned log.
    #[default]
    Channel,
    /// Kafka messaging.
    Kafka,
}

/// Messaging configuration (discriminated union).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// Messaging type discriminator.
    #[serde(rename = "type")]
    pub messaging_type: MessagingType,
    /// Channel broker configuration.
    pub channel: ChannelConfig,
    /// Kafka-specific configuration.
    pub kafka: KafkaConfig,
}

/// In-process broker configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Partitions per topic.
    pub partitions: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self { partitions: 4 }
    }
}

/// Kafka-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KafkaConfig {
    /// Kafka bootstrap servers (comma-separated).
    pub bootstrap_servers: String,
    /// Producer delivery timeout in milliseconds.
    pub message_timeout_ms: u64,
    /// SASL username (optional, for authenticated clusters).
    pub sasl_username: Option<String>,
    /// SASL password (optional, for authenticated clusters).
    pub sasl_password: Option<String>,
    /// SASL mechanism (PLAIN, SCRAM-SHA-256, SCRAM-SHA-512).
    pub sasl_mechanism: Option<String>,
    /// Security protocol (PLAINTEXT, SSL, SASL_PLAINTEXT, SASL_SSL).
    pub security_protocol: Option<String>,
    /// SSL CA certificate path (for SSL connections).
    pub ssl_ca_location: Option<String>,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: "localhost:9092".to_string(),
            message_timeout_ms: 5000,
            sasl_username: None,
            sasl_password: None,
            sasl_mechanism: None,
            security_protocol: None,
            ssl_ca_location: None,
        }
    }
}

// ============================================================================
// Factory
// ============================================================================

/// A configured bus backend, able to hand out producers and consumer groups.
#[derive(Clone)]
pub enum MessageBus {
    Channel(ChannelBroker),
    #[cfg(feature = "kafka")]
    Kafka(KafkaConfig),
}

impl MessageBus {
    pub fn producer(&self) -> Result<Arc<dyn Producer>> {
        match self {
            MessageBus::Channel(broker) => Ok(Arc::new(broker.clone())),
            #[cfg(feature = "kafka")]
            MessageBus::Kafka(config) => Ok(Arc::new(KafkaProducer::new(config)?)),
        }
    }

    pub fn consumer_group(&self, settings: ConsumerSettings) -> Result<Arc<dyn ConsumerGroup>> {
        match self {
            MessageBus::Channel(broker) => Ok(Arc::new(broker.consumer_group(settings))),
            #[cfg(feature = "kafka")]
            MessageBus::Kafka(config) => Ok(Arc::new(KafkaConsumerGroup::new(config, settings)?)),
        }
    }
}

/// Initialize the message bus based on configuration.
///
/// Kafka requires the `kafka` feature.
pub fn init_message_bus(
    config: &MessagingConfig,
) -> std::result::Result<MessageBus, Box<dyn std::error::Error + Send + Sync>> {
    match config.messaging_type {
        MessagingType::Channel => {
            let broker = ChannelBroker::new(config.channel.partitions);
            info!(
                messaging_type = "channel",
                partitions = config.channel.partitions,
                "Message bus initialized"
            );
            Ok(MessageBus::Channel(broker))
        }
        MessagingType::Kafka => {
            #[cfg(feature = "kafka")]
            {
                info!(
                    messaging_type = "kafka",
                    bootstrap_servers = %config.kafka.bootstrap_servers,
                    "Message bus initialized"
                );
                Ok(MessageBus::Kafka(config.kafka.clone()))
            }

            #[cfg(not(feature = "kafka"))]
            {
                Err("Kafka support requires the 'kafka' feature. Rebuild with --features kafka".into())
            }
        }
    }
}
