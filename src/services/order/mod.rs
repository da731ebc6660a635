//! Order service.
//!
//! Owns the order lifecycle:
//!
//! ```text
//! create -> PENDING_PAYMENT --pay--> PAID --ShipAssembled--> ASSEMBLED
//!                 |
//!                 +--cancel--> CANCELLED
//! ```
//!
//! Inventory prices the order at creation, Payment charges it, and the
//! PAID transition is committed together with its `OrderPaid` outbox record.
//! The outbox relay publishes the event; a publish failure never rolls the
//! transition back.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Notify;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clients::{ClientError, InventoryClient, PaymentClient, PaymentRequest};
use crate::domain::part::distinct_price_total;
use crate::domain::{
    Order, OrderPaid, PartsFilter, PaymentMethod, ShipAssembled, Transition, TransitionError,
};
use crate::outbox::order_paid_record;
use crate::storage::{OrderRepository, StorageError};

mod error;

pub use error::{OrderError, Result};

/// Attempts at finding an unused order id before giving up.
const MAX_CREATE_ATTEMPTS: usize = 3;

/// The Order service.
#[derive(Clone)]
pub struct OrderService {
    repository: Arc<dyn OrderRepository>,
    inventory: Arc<dyn InventoryClient>,
    payment: Arc<dyn PaymentClient>,
    order_paid_topic: String,
    outbox_notify: Option<Arc<Notify>>,
}

impl OrderService {
    pub fn new(
        repository: Arc<dyn OrderRepository>,
        inventory: Arc<dyn InventoryClient>,
        payment: Arc<dyn PaymentClient>,
        order_paid_topic: impl Into<String>,
    ) -> Self {
        Self {
            repository,
            inventory,
            payment,
            order_paid_topic: order_paid_topic.into(),
            outbox_notify: None,
        }
    }

    /// Wake the outbox relay after every committed payment.
    pub fn with_outbox_notify(mut self, notify: Arc<Notify>) -> Self {
        self.outbox_notify = Some(notify);
        self
    }

    /// Price and persist a new order awaiting payment.
    #[tracing::instrument(name = "order.create", skip_all, fields(%user_id, parts = part_ids.len()))]
    pub async fn create_order(&self, user_id: Uuid, part_ids: Vec<Uuid>) -> Result<Order> {
        if part_ids.is_empty() {
            return Err(OrderError::EmptyParts);
        }

        let requested: HashSet<Uuid> = part_ids.iter().copied().collect();
        let parts = self
            .inventory
            .list_parts(&PartsFilter::by_ids(requested.iter().copied()))
            .await
            .map_err(|e| {
                warn!(error = %e, "Inventory lookup failed");
                OrderError::InventoryUnavailable(e)
            })?;
        let parts: Vec<_> = parts
            .into_iter()
            .filter(|p| requested.contains(&p.id))
            .collect();

        let found: HashSet<Uuid> = parts.iter().map(|p| p.id).collect();
        let mut reported = HashSet::new();
        let missing: Vec<Uuid> = part_ids
            .iter()
            .copied()
            .filter(|id| !found.contains(id) && reported.insert(*id))
            .collect();
        if !missing.is_empty() {
            return Err(OrderError::PartsNotFound { missing });
        }

        let total_price = distinct_price_total(&parts);

        for attempt in 1..=MAX_CREATE_ATTEMPTS {
            let order = Order::new(
                Uuid::new_v4(),
                user_id,
                part_ids.clone(),
                total_price,
                Utc::now(),
            );
            match self.repository.create(&order).await {
                Ok(()) => {
                    info!(order_id = %order.order_id, total_price, "Order created");
                    return Ok(order);
                }
                Err(StorageError::Duplicate(id)) => {
                    warn!(order_id = %id, attempt, "Order id collision, regenerating");
                }
                Err(e) => return Err(OrderError::CreateFailed(e.to_string())),
            }
        }

        Err(OrderError::CreateFailed(format!(
            "no unused order id after {MAX_CREATE_ATTEMPTS} attempts"
        )))
    }

    #[tracing::instrument(name = "order.get", skip_all, fields(%order_id))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<Order> {
        self.load(order_id).await
    }

    /// Charge the order and mark it PAID. Returns the transaction id.
    #[tracing::instrument(name = "order.pay", skip_all, fields(%order_id, %method))]
    pub async fn pay_order(&self, order_id: Uuid, method: PaymentMethod) -> Result<String> {
        let mut order = self.load(order_id).await?;
        order
            .ensure_payable()
            .map_err(|e| transition_error(&order, e))?;

        let transaction_id = self
            .payment
            .pay_order(PaymentRequest {
                order_id,
                user_id: order.user_id,
                method,
                idempotency_key: order_id.to_string(),
            })
            .await
            .map_err(|e| {
                warn!(error = %e, "Payment failed");
                OrderError::PaymentFailed(e)
            })?;

        order
            .pay(transaction_id.clone(), method, Utc::now())
            .map_err(|e| transition_error(&order, e))?;

        let event = OrderPaid::new(order_id, order.user_id, method, transaction_id.clone());
        let record = order_paid_record(&event, &self.order_paid_topic)
            .map_err(|e| OrderError::UpdateFailed(e.to_string()))?;

        self.repository
            .update_with_outbox(order_id, &order, vec![record])
            .await
            .map_err(|e| update_error(order_id, e))?;

        if let Some(notify) = &self.outbox_notify {
            notify.notify_one();
        }

        info!(
            transaction_id = %transaction_id,
            event_id = %event.event_id,
            "Order paid"
        );
        Ok(transaction_id)
    }

    /// Cancel an unpaid order. Cancelling twice is a no-op.
    #[tracing::instrument(name = "order.cancel", skip_all, fields(%order_id))]
    pub async fn cancel_order(&self, order_id: Uuid) -> Result<()> {
        let mut order = self.load(order_id).await?;

        match order.cancel(Utc::now()) {
            Ok(Transition::Unchanged) => {
                debug!("Order already cancelled");
                Ok(())
            }
            Ok(Transition::Applied) => {
                self.repository
                    .update(order_id, &order)
                    .await
                    .map_err(|e| update_error(order_id, e))?;
                info!("Order cancelled");
                Ok(())
            }
            Err(e) => Err(transition_error(&order, e)),
        }
    }

    /// Apply a `ShipAssembled` event.
    ///
    /// Returns `Ok` whenever the message should be acknowledged: applied,
    /// already applied, unknown order, or an order that is not PAID. Storage
    /// failures are returned so the bus redelivers.
    #[tracing::instrument(
        name = "order.ship_assembled",
        skip_all,
        fields(order_id = %event.order_id, event_id = %event.event_id)
    )]
    pub async fn handle_ship_assembled(&self, event: &ShipAssembled) -> Result<()> {
        let mut order = match self.repository.get(event.order_id).await {
            Ok(order) => order,
            Err(StorageError::NotFound(_)) => {
                warn!("ShipAssembled for unknown order, acknowledging");
                return Ok(());
            }
            Err(e) => return Err(OrderError::GetFailed(e.to_string())),
        };

        match order.assemble(Utc::now()) {
            Ok(Transition::Unchanged) => {
                debug!("Order already assembled");
                Ok(())
            }
            Ok(Transition::Applied) => {
                self.repository
                    .update(event.order_id, &order)
                    .await
                    .map_err(|e| update_error(event.order_id, e))?;
                info!(
                    build_time_seconds = event.build_time_seconds,
                    "Order assembled"
                );
                Ok(())
            }
            Err(e) => {
                warn!(status = %order.status, error = %e, "ShipAssembled for order that is not paid, acknowledging");
                Ok(())
            }
        }
    }

    async fn load(&self, order_id: Uuid) -> Result<Order> {
        self.repository.get(order_id).await.map_err(|e| match e {
            StorageError::NotFound(_) => OrderError::OrderNotFound(order_id),
            other => OrderError::GetFailed(other.to_string()),
        })
    }
}

fn transition_error(order: &Order, err: TransitionError) -> OrderError {
    match err {
        TransitionError::AlreadyPaid => OrderError::AlreadyPaid(order.order_id),
        TransitionError::NotPayable(status) => OrderError::NotPayable {
            order_id: order.order_id,
            status,
        },
        TransitionError::NotCancellable(status) => OrderError::CannotCancelPaid {
            order_id: order.order_id,
            status,
        },
        TransitionError::MissingTransaction => {
            OrderError::PaymentFailed(ClientError::Internal(err.to_string()))
        }
        TransitionError::NotAssemblable(_) => OrderError::UpdateFailed(err.to_string()),
    }
}

fn update_error(order_id: Uuid, err: StorageError) -> OrderError {
    match err {
        StorageError::NotFound(_) => OrderError::OrderNotFound(order_id),
        StorageError::Conflict { .. } => {
            warn!(%order_id, error = %err, "Concurrent modification");
            OrderError::ConcurrentModification(order_id)
        }
        other => OrderError::UpdateFailed(other.to_string()),
    }
}
