//! Assembly worker.
//!
//! Consumes `order.paid`, "builds" the ship by waiting `build_duration`,
//! then publishes `ShipAssembled`. A redelivered `OrderPaid` builds again
//! and publishes a second event with a fresh id; the Order service
//! converges on either.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{reject_payload, InvalidPayloadPolicy};
use crate::bus::{BusError, Message, MessageHandler};
use crate::codec;
use crate::domain::ShipAssembled;
use crate::events::ShipAssembledProducer;

/// Assembly configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AssemblyConfig {
    /// Simulated build time.
    pub build_duration_secs: u64,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            build_duration_secs: 10,
        }
    }
}

impl AssemblyConfig {
    pub fn build_duration(&self) -> Duration {
        Duration::from_secs(self.build_duration_secs)
    }
}

/// Handles `OrderPaid` messages for the Assembly service.
pub struct AssemblyWorker {
    producer: ShipAssembledProducer,
    build_duration: Duration,
    policy: InvalidPayloadPolicy,
}

impl AssemblyWorker {
    pub fn new(
        producer: ShipAssembledProducer,
        build_duration: Duration,
        policy: InvalidPayloadPolicy,
    ) -> Self {
        Self {
            producer,
            build_duration,
            policy,
        }
    }
}

impl MessageHandler for AssemblyWorker {
    fn handle(
        &self,
        ctx: CancellationToken,
        message: Arc<Message>,
    ) -> BoxFuture<'static, Result<(), BusError>> {
        let producer = self.producer.clone();
        let build_duration = self.build_duration;
        let policy = self.policy;

        Box::pin(async move {
            let paid = match codec::decode_order_paid(&message.value) {
                Ok(event) => event,
                Err(e) => return reject_payload(policy, &message, e),
            };

            let start = tokio::time::Instant::now();
            tokio::select! {
                _ = ctx.cancelled() => {
                    warn!(order_id = %paid.order_id, "Assembly interrupted");
                    return Err(BusError::Cancelled);
                }
                _ = tokio::time::sleep(build_duration) => {}
            }
            let build_time_seconds = i64::try_from(start.elapsed().as_secs()).unwrap_or(i64::MAX);

            let assembled = ShipAssembled::new(paid.order_id, paid.user_id, build_time_seconds);
            producer
                .emit(&assembled)
                .await
                .map_err(|e| BusError::Handler(e.to_string()))?;

            info!(
                order_id = %paid.order_id,
                event_id = %assembled.event_id,
                build_time_seconds,
                "Ship assembled"
            );
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::bus::MockProducer;
    use crate::domain::{OrderPaid, PaymentMethod};

    fn paid_message() -> (OrderPaid, Arc<Message>) {
        let event = OrderPaid::new(Uuid::new_v4(), Uuid::new_v4(), PaymentMethod::Card, "tx");
        let message = Arc::new(Message {
            topic: "order.paid".to_string(),
            partition: 1,
            offset: 0,
            key: event.event_id.as_bytes().to_vec(),
            value: codec::encode_order_paid(&event).unwrap(),
        });
        (event, message)
    }

    fn worker(producer: Arc<MockProducer>, build: Duration) -> AssemblyWorker {
        AssemblyWorker::new(
            ShipAssembledProducer::new(producer, "ship.assembled"),
            build,
            InvalidPayloadPolicy::Retry,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_publishes_ship_assembled_after_build() {
        let producer = Arc::new(MockProducer::new());
        let (paid, message) = paid_message();

        worker(producer.clone(), Duration::from_secs(10))
            .handle(CancellationToken::new(), message)
            .await
            .unwrap();

        let sent = producer.take_sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].topic, "ship.assembled");
        let event = codec::decode_ship_assembled(&sent[0].value).unwrap();
        assert_eq!(event.order_id, paid.order_id);
        assert_eq!(event.user_id, paid.user_id);
        assert_eq!(event.build_time_seconds, 10);
        assert_ne!(event.event_id, paid.event_id);
        assert_eq!(sent[0].key, event.event_id.as_bytes().to_vec());
    }

    #[tokio::test]
    async fn test_redelivery_builds_again_with_fresh_event_id() {
        let producer = Arc::new(MockProducer::new());
        let worker = worker(producer.clone(), Duration::ZERO);
        let (_, message) = paid_message();

        worker
            .handle(CancellationToken::new(), Arc::clone(&message))
            .await
            .unwrap();
        worker
            .handle(CancellationToken::new(), message)
            .await
            .unwrap();

        let sent = producer.take_sent().await;
        assert_eq!(sent.len(), 2);
        assert_ne!(sent[0].key, sent[1].key);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_aborts_build_without_publishing() {
        let producer = Arc::new(MockProducer::new());
        let worker = worker(producer.clone(), Duration::from_secs(10));
        let (_, message) = paid_message();
        let ctx = CancellationToken::new();

        let handle = worker.handle(ctx.clone(), message);
        let task = tokio::spawn(handle);
        tokio::time::sleep(Duration::from_secs(2)).await;
        ctx.cancel();

        assert!(matches!(task.await.unwrap(), Err(BusError::Cancelled)));
        assert_eq!(producer.sent_count().await, 0);
    }

    #[tokio::test]
    async fn test_send_failure_is_returned() {
        let producer = Arc::new(MockProducer::new());
        producer.set_fail_on_send(true).await;
        let (_, message) = paid_message();

        let result = worker(producer, Duration::ZERO)
            .handle(CancellationToken::new(), message)
            .await;

        assert!(matches!(result, Err(BusError::Handler(_))));
    }

    #[tokio::test]
    async fn test_invalid_payload_drop_policy_acknowledges() {
        let producer = Arc::new(MockProducer::new());
        let worker = AssemblyWorker::new(
            ShipAssembledProducer::new(producer.clone(), "ship.assembled"),
            Duration::ZERO,
            InvalidPayloadPolicy::Drop,
        );
        let message = Arc::new(Message {
            topic: "order.paid".to_string(),
            partition: 0,
            offset: 3,
            key: vec![],
            value: vec![0x22, 0x01, 0x00],
        });

        worker
            .handle(CancellationToken::new(), message)
            .await
            .unwrap();
        assert_eq!(producer.sent_count().await, 0);
    }

    #[test]
    fn test_default_build_duration() {
        assert_eq!(AssemblyConfig::default().build_duration(), Duration::from_secs(10));
    }
}
