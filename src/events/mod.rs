//! Typed event producers.
//!
//! Wrap a bus [`Producer`] with the event codec. The message key is the
//! event id, the value is the encoded payload, and the send is synchronous:
//! `Ok` means the broker acknowledged the message.

use std::sync::Arc;

use tracing::{debug, error};

use crate::bus::{BusError, Producer};
use crate::codec::{self, CodecError};
use crate::domain::{Event, OrderPaid, ShipAssembled};

/// Result type for producer operations.
pub type Result<T> = std::result::Result<T, ProducerError>;

/// Errors that can occur while emitting an event.
#[derive(Debug, thiserror::Error)]
pub enum ProducerError {
    #[error("Event encoding failed: {0}")]
    EncodeFailed(#[from] CodecError),

    #[error("Event send failed: {0}")]
    SendFailed(#[from] BusError),
}

/// Message key for an event.
pub fn event_key(event: &Event) -> Vec<u8> {
    event.event_id().as_bytes().to_vec()
}

async fn publish(producer: &dyn Producer, topic: &str, event: &Event) -> Result<()> {
    let payload = codec::encode(event)?;
    let key = event_key(event);

    producer.send(topic, &key, &payload).await.map_err(|e| {
        error!(
            topic = %topic,
            event_id = %event.event_id(),
            order_id = %event.order_id(),
            error = %e,
            "Event send failed"
        );
        ProducerError::SendFailed(e)
    })?;

    debug!(
        topic = %topic,
        kind = %event.kind(),
        event_id = %event.event_id(),
        order_id = %event.order_id(),
        "Event published"
    );
    Ok(())
}

/// Publishes `OrderPaid` events.
#[derive(Clone)]
pub struct OrderPaidProducer {
    producer: Arc<dyn Producer>,
    topic: String,
}

impl OrderPaidProducer {
    pub fn new(producer: Arc<dyn Producer>, topic: impl Into<String>) -> Self {
        Self {
            producer,
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub async fn emit(&self, event: &OrderPaid) -> Result<()> {
        self.emit_to(&self.topic, event).await
    }

    /// Send to `topic` instead of the configured one.
    pub async fn emit_to(&self, topic: &str, event: &OrderPaid) -> Result<()> {
        publish(self.producer.as_ref(), topic, &Event::from(event.clone())).await
    }
}

/// Publishes `ShipAssembled` events.
#[derive(Clone)]
pub struct ShipAssembledProducer {
    producer: Arc<dyn Producer>,
    topic: String,
}

impl ShipAssembledProducer {
    pub fn new(producer: Arc<dyn Producer>, topic: impl Into<String>) -> Self {
        Self {
            producer,
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub async fn emit(&self, event: &ShipAssembled) -> Result<()> {
        publish(self.producer.as_ref(), &self.topic, &Event::from(event.clone())).await
    }
}
