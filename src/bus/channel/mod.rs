//! In-memory partitioned log for standalone mode.
//!
//! Each topic is split into a fixed number of partitions. A record's key
//! picks its partition, so records sharing a key keep their order. Consumer
//! groups track a committed offset per partition and claim ownership of a
//! partition while they run, so at most one consumer of a group reads it.
//! Ideal for local development and testing without external dependencies.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::{
    deliver_with_retry, BusError, ConsumerGroup, ConsumerSettings, Delivery, Message,
    MessageHandler, Producer, Result,
};

/// (group, topic, partition)
type PartitionKey = (String, String, i32);

struct TopicLog {
    partitions: Vec<RwLock<Vec<Arc<Message>>>>,
    /// Bumped after every append so idle partition readers wake up.
    appended: watch::Sender<u64>,
}

impl TopicLog {
    fn new(partitions: usize) -> Self {
        let (appended, _) = watch::channel(0);
        Self {
            partitions: (0..partitions).map(|_| RwLock::new(Vec::new())).collect(),
            appended,
        }
    }
}

struct BrokerInner {
    partitions: usize,
    topics: RwLock<HashMap<String, Arc<TopicLog>>>,
    committed: RwLock<HashMap<PartitionKey, i64>>,
    owners: RwLock<HashSet<PartitionKey>>,
    closed: AtomicBool,
}

/// In-process broker implementing both sides of the bus.
#[derive(Clone)]
pub struct ChannelBroker {
    inner: Arc<BrokerInner>,
}

impl ChannelBroker {
    /// Create a broker with `partitions` partitions per topic (at least one).
    pub fn new(partitions: usize) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                partitions: partitions.max(1),
                topics: RwLock::new(HashMap::new()),
                committed: RwLock::new(HashMap::new()),
                owners: RwLock::new(HashSet::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn partitions(&self) -> usize {
        self.inner.partitions
    }

    /// Partition a key routes to.
    pub fn partition_for(&self, key: &[u8]) -> i32 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.inner.partitions as u64) as i32
    }

    /// Build a consumer group bound to this broker.
    pub fn consumer_group(&self, settings: ConsumerSettings) -> ChannelConsumerGroup {
        ChannelConsumerGroup {
            broker: self.clone(),
            settings,
        }
    }

    /// Reject further sends. Already stored records stay readable.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        info!("Channel broker closed");
    }

    /// All records of a topic, partition by partition.
    pub async fn messages(&self, topic: &str) -> Vec<Arc<Message>> {
        let log = match self.inner.topics.read().await.get(topic) {
            Some(log) => Arc::clone(log),
            None => return Vec::new(),
        };
        let mut out = Vec::new();
        for partition in &log.partitions {
            out.extend(partition.read().await.iter().cloned());
        }
        out
    }

    /// Next offset the group will read from a partition.
    pub async fn committed_offset(&self, group: &str, topic: &str, partition: i32) -> i64 {
        let key = (group.to_string(), topic.to_string(), partition);
        self.inner
            .committed
            .read()
            .await
            .get(&key)
            .copied()
            .unwrap_or(0)
    }

    async fn topic(&self, name: &str) -> Arc<TopicLog> {
        if let Some(log) = self.inner.topics.read().await.get(name) {
            return Arc::clone(log);
        }
        let mut topics = self.inner.topics.write().await;
        Arc::clone(
            topics
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(TopicLog::new(self.inner.partitions))),
        )
    }

    async fn claim(&self, key: &PartitionKey) -> bool {
        self.inner.owners.write().await.insert(key.clone())
    }

    async fn release(&self, key: &PartitionKey) {
        self.inner.owners.write().await.remove(key);
    }

    async fn commit(&self, key: &PartitionKey, next_offset: i64) {
        self.inner
            .committed
            .write()
            .await
            .insert(key.clone(), next_offset);
    }
}

#[async_trait]
impl Producer for ChannelBroker {
    #[tracing::instrument(name = "bus.send", skip_all, fields(topic = %topic))]
    async fn send(&self, topic: &str, key: &[u8], value: &[u8]) -> Result<()> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(BusError::BrokerUnavailable(
                "channel broker is closed".to_string(),
            ));
        }

        let log = self.topic(topic).await;
        let partition = self.partition_for(key);
        let offset = {
            let mut records = log.partitions[partition as usize].write().await;
            let offset = records.len() as i64;
            records.push(Arc::new(Message {
                topic: topic.to_string(),
                partition,
                offset,
                key: key.to_vec(),
                value: value.to_vec(),
            }));
            offset
        };
        log.appended.send_modify(|n| *n = n.wrapping_add(1));

        debug!(partition, offset, "Appended record to channel topic");
        Ok(())
    }
}

/// Consumer group reading from a [`ChannelBroker`].
pub struct ChannelConsumerGroup {
    broker: ChannelBroker,
    settings: ConsumerSettings,
}

impl ChannelConsumerGroup {
    async fn consume_partition(
        broker: ChannelBroker,
        log: Arc<TopicLog>,
        key: PartitionKey,
        ctx: CancellationToken,
        handler: Arc<dyn MessageHandler>,
        settings: ConsumerSettings,
    ) {
        let (_, topic, partition) = &key;
        let mut appended = log.appended.subscribe();

        loop {
            if ctx.is_cancelled() {
                break;
            }
            appended.borrow_and_update();

            let offset = broker
                .committed_offset(&settings.group_id, topic, *partition)
                .await;
            let next = log.partitions[*partition as usize]
                .read()
                .await
                .get(offset as usize)
                .cloned();

            let Some(message) = next else {
                tokio::select! {
                    _ = ctx.cancelled() => break,
                    changed = appended.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                continue;
            };

            match deliver_with_retry(&ctx, &handler, message, &settings).await {
                Delivery::Completed => broker.commit(&key, offset + 1).await,
                Delivery::Abandoned => break,
            }
        }

        debug!(
            group = %settings.group_id,
            topic = %topic,
            partition,
            "Partition consumer stopped"
        );
    }
}

#[async_trait]
impl ConsumerGroup for ChannelConsumerGroup {
    async fn run(&self, ctx: CancellationToken, handler: Arc<dyn MessageHandler>) -> Result<()> {
        if self.settings.topics.is_empty() {
            return Err(BusError::Subscribe("no topics configured".to_string()));
        }

        let mut tasks = JoinSet::new();
        let mut owned = Vec::new();

        for topic in &self.settings.topics {
            let log = self.broker.topic(topic).await;
            for partition in 0..self.broker.partitions() as i32 {
                let key = (self.settings.group_id.clone(), topic.clone(), partition);
                if !self.broker.claim(&key).await {
                    debug!(
                        group = %self.settings.group_id,
                        topic = %topic,
                        partition,
                        "Partition already owned within group"
                    );
                    continue;
                }
                owned.push(key.clone());
                tasks.spawn(Self::consume_partition(
                    self.broker.clone(),
                    Arc::clone(&log),
                    key,
                    ctx.clone(),
                    Arc::clone(&handler),
                    self.settings.clone(),
                ));
            }
        }

        info!(
            group = %self.settings.group_id,
            topics = ?self.settings.topics,
            partitions = owned.len(),
            "Channel consumer group started"
        );

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(group = %self.settings.group_id, error = %e, "Partition consumer panicked");
            }
        }

        for key in &owned {
            self.broker.release(key).await;
        }

        info!(group = %self.settings.group_id, "Channel consumer group stopped");
        Ok(())
    }
}
