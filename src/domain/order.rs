//! Order aggregate and its lifecycle transitions.
//!
//! ```text
//! (none) --create--> PENDING_PAYMENT --pay--> PAID --ShipAssembled--> ASSEMBLED
//!                          |
//!                          +--cancel--> CANCELLED
//! ```
//!
//! `CANCELLED` and `ASSEMBLED` are terminal. Every transition is a method on
//! [`Order`], so the status, transaction and payment method can only change
//! together.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ParseVariantError;

/// Order lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    PendingPayment,
    Paid,
    Assembled,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingPayment => "PENDING_PAYMENT",
            OrderStatus::Paid => "PAID",
            OrderStatus::Assembled => "ASSEMBLED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    /// No transition leaves a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Assembled | OrderStatus::Cancelled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ParseVariantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING_PAYMENT" => Ok(OrderStatus::PendingPayment),
            "PAID" => Ok(OrderStatus::Paid),
            "ASSEMBLED" => Ok(OrderStatus::Assembled),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            other => Err(ParseVariantError::new("order status", other)),
        }
    }
}

/// How an order was paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Card,
    Sbp,
    CreditCard,
    InvestorMoney,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "CARD",
            PaymentMethod::Sbp => "SBP",
            PaymentMethod::CreditCard => "CREDIT_CARD",
            PaymentMethod::InvestorMoney => "INVESTOR_MONEY",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = ParseVariantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CARD" => Ok(PaymentMethod::Card),
            "SBP" => Ok(PaymentMethod::Sbp),
            "CREDIT_CARD" => Ok(PaymentMethod::CreditCard),
            "INVESTOR_MONEY" => Ok(PaymentMethod::InvestorMoney),
            other => Err(ParseVariantError::new("payment method", other)),
        }
    }
}

/// Rejected lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("Order is already paid")]
    AlreadyPaid,

    #[error("Order in status {0} cannot be paid")]
    NotPayable(OrderStatus),

    #[error("Order in status {0} cannot be cancelled")]
    NotCancellable(OrderStatus),

    #[error("Order in status {0} cannot be assembled")]
    NotAssemblable(OrderStatus),

    #[error("Payment returned an empty transaction id")]
    MissingTransaction,
}

/// Outcome of an idempotent transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The order changed and must be persisted.
    Applied,
    /// The order was already in the target status.
    Unchanged,
}

/// The order aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: Uuid,
    pub user_id: Uuid,
    /// One entry per order line; duplicates are allowed.
    pub part_ids: Vec<Uuid>,
    /// Minor currency units. Fixed at creation.
    pub total_price: i64,
    pub status: OrderStatus,
    pub transaction_id: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency token, bumped by every successful update.
    pub version: i64,
}

impl Order {
    /// Create a new order awaiting payment.
    pub fn new(
        order_id: Uuid,
        user_id: Uuid,
        part_ids: Vec<Uuid>,
        total_price: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            order_id,
            user_id,
            part_ids,
            total_price,
            status: OrderStatus::PendingPayment,
            transaction_id: None,
            payment_method: None,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    /// Check that the order may be sent to Payment.
    pub fn ensure_payable(&self) -> Result<(), TransitionError> {
        match self.status {
            OrderStatus::PendingPayment => Ok(()),
            OrderStatus::Paid => Err(TransitionError::AlreadyPaid),
            status @ (OrderStatus::Assembled | OrderStatus::Cancelled) => {
                Err(TransitionError::NotPayable(status))
            }
        }
    }

    /// PENDING_PAYMENT -> PAID.
    pub fn pay(
        &mut self,
        transaction_id: String,
        method: PaymentMethod,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.ensure_payable()?;
        if transaction_id.is_empty() {
            return Err(TransitionError::MissingTransaction);
        }
        self.status = OrderStatus::Paid;
        self.transaction_id = Some(transaction_id);
        self.payment_method = Some(method);
        self.updated_at = now;
        Ok(())
    }

    /// PENDING_PAYMENT -> CANCELLED. Cancelling a cancelled order is a no-op.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<Transition, TransitionError> {
        match self.status {
            OrderStatus::PendingPayment => {
                self.status = OrderStatus::Cancelled;
                self.updated_at = now;
                Ok(Transition::Applied)
            }
            OrderStatus::Cancelled => Ok(Transition::Unchanged),
            status @ (OrderStatus::Paid | OrderStatus::Assembled) => {
                Err(TransitionError::NotCancellable(status))
            }
        }
    }

    /// PAID -> ASSEMBLED. Assembling an assembled order is a no-op.
    pub fn assemble(&mut self, now: DateTime<Utc>) -> Result<Transition, TransitionError> {
        match self.status {
            OrderStatus::Paid => {
                self.status = OrderStatus::Assembled;
                self.updated_at = now;
                Ok(Transition::Applied)
            }
            OrderStatus::Assembled => Ok(Transition::Unchanged),
            status @ (OrderStatus::PendingPayment | OrderStatus::Cancelled) => {
                Err(TransitionError::NotAssemblable(status))
            }
        }
    }
}
