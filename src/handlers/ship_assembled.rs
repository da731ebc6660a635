//! `ship.assembled` consumer for the Order service.

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{reject_payload, InvalidPayloadPolicy};
use crate::bus::{BusError, Message, MessageHandler};
use crate::codec;
use crate::services::order::OrderService;

/// Decodes `ShipAssembled` and advances the order to ASSEMBLED.
///
/// Any error from the Order service is returned to the bus, so the message
/// is redelivered; the transition is idempotent.
pub struct ShipAssembledHandler {
    service: Arc<OrderService>,
    policy: InvalidPayloadPolicy,
}

impl ShipAssembledHandler {
    pub fn new(service: Arc<OrderService>, policy: InvalidPayloadPolicy) -> Self {
        Self { service, policy }
    }
}

impl MessageHandler for ShipAssembledHandler {
    fn handle(
        &self,
        _ctx: CancellationToken,
        message: Arc<Message>,
    ) -> BoxFuture<'static, Result<(), BusError>> {
        let service = Arc::clone(&self.service);
        let policy = self.policy;

        Box::pin(async move {
            let event = match codec::decode_ship_assembled(&message.value) {
                Ok(event) => event,
                Err(e) => return reject_payload(policy, &message, e),
            };

            debug!(
                order_id = %event.order_id,
                event_id = %event.event_id,
                offset = message.offset,
                "Received ShipAssembled"
            );

            service
                .handle_ship_assembled(&event)
                .await
                .map_err(|e| BusError::Handler(e.to_string()))
        })
    }
}
