//! Outbox relay.
//!
//! `OrderPaid` is written to the outbox in the same transaction as the PAID
//! transition. The relay drains pending records in creation order and
//! publishes them, so an event is emitted at least once for every committed
//! transition even if the process dies right after the commit.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::codec;
use crate::domain::{EventKind, OrderPaid};
use crate::events::OrderPaidProducer;
use crate::storage::{self, OutboxRecord, OutboxStore};

/// Relay configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutboxConfig {
    /// Interval between passes when nothing nudges the relay.
    pub poll_interval_ms: u64,
    /// Records fetched per query.
    pub batch_size: usize,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            batch_size: 100,
        }
    }
}

impl OutboxConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Build the outbox record for an `OrderPaid` event.
pub fn order_paid_record(event: &OrderPaid, topic: &str) -> codec::Result<OutboxRecord> {
    Ok(OutboxRecord {
        id: event.event_id,
        kind: EventKind::OrderPaid,
        topic: topic.to_string(),
        key: event.event_id.as_bytes().to_vec(),
        payload: codec::encode_order_paid(event)?,
        created_at: Utc::now(),
        attempts: 0,
    })
}

/// Result of one relay pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainStats {
    pub published: usize,
    pub discarded: usize,
    pub failed: usize,
}

/// Publishes pending outbox records.
pub struct OutboxRelay {
    store: Arc<dyn OutboxStore>,
    producer: OrderPaidProducer,
    config: OutboxConfig,
    notify: Arc<Notify>,
}

impl OutboxRelay {
    pub fn new(store: Arc<dyn OutboxStore>, producer: OrderPaidProducer, config: OutboxConfig) -> Self {
        Self {
            store,
            producer,
            config,
            notify: Arc::new(Notify::new()),
        }
    }

    /// Handle used by writers to wake the relay right after a commit.
    pub fn notifier(&self) -> Arc<Notify> {
        Arc::clone(&self.notify)
    }

    /// Publish pending records until none are left or a send fails.
    ///
    /// A failed send stops the pass so later records are not published ahead
    /// of it; it is retried on the next pass.
    pub async fn drain_once(&self) -> storage::Result<DrainStats> {
        let mut stats = DrainStats::default();
        let batch_size = self.config.batch_size.max(1);

        loop {
            let batch = self.store.pending(batch_size).await?;
            let full = batch.len() == batch_size;

            for record in batch {
                match self.publish(&record).await {
                    Outcome::Published => {
                        self.store.mark_published(record.id).await?;
                        stats.published += 1;
                    }
                    Outcome::Discard => {
                        self.store.mark_published(record.id).await?;
                        stats.discarded += 1;
                    }
                    Outcome::Failed => {
                        self.store.record_failure(record.id).await?;
                        stats.failed += 1;
                        return Ok(stats);
                    }
                }
            }

            if !full {
                return Ok(stats);
            }
        }
    }

    async fn publish(&self, record: &OutboxRecord) -> Outcome {
        if record.kind != EventKind::OrderPaid {
            error!(
                record_id = %record.id,
                kind = %record.kind,
                "Outbox record of unsupported kind, discarding"
            );
            return Outcome::Discard;
        }

        let event = match codec::decode_order_paid(&record.payload) {
            Ok(event) => event,
            Err(e) => {
                error!(
                    record_id = %record.id,
                    error = %e,
                    "Undecodable outbox payload, discarding"
                );
                return Outcome::Discard;
            }
        };

        // An empty topic falls back to the configured one.
        let topic = if record.topic.is_empty() {
            self.producer.topic()
        } else {
            record.topic.as_str()
        };

        match self.producer.emit_to(topic, &event).await {
            Ok(()) => {
                debug!(
                    record_id = %record.id,
                    order_id = %event.order_id,
                    topic,
                    "Outbox record published"
                );
                Outcome::Published
            }
            Err(e) => {
                warn!(
                    record_id = %record.id,
                    order_id = %event.order_id,
                    attempts = record.attempts + 1,
                    error = %e,
                    "Outbox publish failed, will retry"
                );
                Outcome::Failed
            }
        }
    }

    /// Drain on every nudge or poll tick until `ctx` is cancelled.
    pub async fn run(self, ctx: CancellationToken) {
        info!(
            topic = %self.producer.topic(),
            poll_interval_ms = self.config.poll_interval_ms,
            "Outbox relay started"
        );

        loop {
            if let Err(e) = self.drain_once().await {
                warn!(error = %e, "Outbox pass failed");
            }

            tokio::select! {
                _ = ctx.cancelled() => break,
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(self.config.poll_interval()) => {}
            }
        }

        info!("Outbox relay stopped");
    }
}

enum Outcome {
    Published,
    Discard,
    Failed,
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::bus::MockProducer;
    use crate::domain::{Order, PaymentMethod};
    use crate::storage::{InMemoryOrderStore, OrderRepository};

    struct Fixture {
        store: Arc<InMemoryOrderStore>,
        producer: Arc<MockProducer>,
        relay: OutboxRelay,
        order: Order,
    }

    async fn fixture(batch_size: usize) -> Fixture {
        let store = Arc::new(InMemoryOrderStore::new());
        let producer = Arc::new(MockProducer::new());
        let relay = OutboxRelay::new(
            store.clone(),
            OrderPaidProducer::new(producer.clone(), "order.paid"),
            OutboxConfig {
                poll_interval_ms: 10,
                batch_size,
            },
        );
        let order = Order::new(Uuid::new_v4(), Uuid::new_v4(), vec![], 0, Utc::now());
        store.create(&order).await.unwrap();
        Fixture {
            store,
            producer,
            relay,
            order,
        }
    }

    fn paid(order: &Order) -> OrderPaid {
        OrderPaid::new(order.order_id, order.user_id, PaymentMethod::Card, "tx")
    }

    #[tokio::test]
    async fn test_publishes_in_creation_order() {
        let f = fixture(2).await;
        let events: Vec<_> = (0..3).map(|_| paid(&f.order)).collect();
        let records = events
            .iter()
            .map(|e| order_paid_record(e, "order.paid").unwrap())
            .collect();
        f.store
            .update_with_outbox(f.order.order_id, &f.order, records)
            .await
            .unwrap();

        let stats = f.relay.drain_once().await.unwrap();

        assert_eq!(stats.published, 3);
        let keys: Vec<_> = f.producer.sent().await.into_iter().map(|m| m.key).collect();
        let expected: Vec<_> = events.iter().map(|e| e.event_id.as_bytes().to_vec()).collect();
        assert_eq!(keys, expected);
        assert!(f.store.pending(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_send_is_retried_next_pass() {
        let f = fixture(10).await;
        let record = order_paid_record(&paid(&f.order), "order.paid").unwrap();
        f.store
            .update_with_outbox(f.order.order_id, &f.order, vec![record.clone()])
            .await
            .unwrap();

        f.producer.set_fail_on_send(true).await;
        let stats = f.relay.drain_once().await.unwrap();
        assert_eq!(stats.failed, 1);
        let pending = f.store.pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 1);

        f.producer.set_fail_on_send(false).await;
        let stats = f.relay.drain_once().await.unwrap();
        assert_eq!(stats.published, 1);
        assert_eq!(f.producer.sent_count().await, 1);
    }

    #[tokio::test]
    async fn test_record_is_sent_to_its_own_topic() {
        let f = fixture(10).await;
        let routed = order_paid_record(&paid(&f.order), "order.paid.v2").unwrap();
        let mut untagged = order_paid_record(&paid(&f.order), "order.paid.v2").unwrap();
        untagged.topic = String::new();
        f.store
            .update_with_outbox(f.order.order_id, &f.order, vec![routed, untagged])
            .await
            .unwrap();

        let stats = f.relay.drain_once().await.unwrap();

        assert_eq!(stats.published, 2);
        let topics: Vec<_> = f.producer.sent().await.into_iter().map(|m| m.topic).collect();
        assert_eq!(topics, vec!["order.paid.v2", "order.paid"]);
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_discarded() {
        let f = fixture(10).await;
        let mut record = order_paid_record(&paid(&f.order), "order.paid").unwrap();
        record.payload = vec![0xff, 0xff, 0xff];
        f.store
            .update_with_outbox(f.order.order_id, &f.order, vec![record])
            .await
            .unwrap();

        let stats = f.relay.drain_once().await.unwrap();

        assert_eq!(stats.discarded, 1);
        assert_eq!(f.producer.sent_count().await, 0);
        assert!(f.store.pending(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_nudge_wakes_relay() {
        let f = fixture(10).await;
        let relay = OutboxRelay::new(
            f.store.clone(),
            OrderPaidProducer::new(f.producer.clone(), "order.paid"),
            OutboxConfig {
                poll_interval_ms: 60_000,
                batch_size: 10,
            },
        );
        let notify = relay.notifier();
        let ctx = CancellationToken::new();
        let task = tokio::spawn(relay.run(ctx.clone()));

        // Let the first (empty) pass finish before committing.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let record = order_paid_record(&paid(&f.order), "order.paid").unwrap();
        f.store
            .update_with_outbox(f.order.order_id, &f.order, vec![record])
            .await
            .unwrap();
        notify.notify_one();

        for _ in 0..100 {
            if f.producer.sent_count().await == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(f.producer.sent_count().await, 1);

        ctx.cancel();
        task.await.unwrap();
    }
}
