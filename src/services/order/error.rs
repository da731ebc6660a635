//! Order service errors.

use axum::http::StatusCode;
use tonic::Status;
use uuid::Uuid;

use crate::clients::ClientError;
use crate::domain::OrderStatus;

/// Result type for order operations.
pub type Result<T> = std::result::Result<T, OrderError>;

/// Errors returned by [`OrderService`](super::OrderService).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderError {
    #[error("Order must contain at least one part")]
    EmptyParts,

    #[error("Invalid payment method: {0}")]
    InvalidPaymentMethod(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Order not found: {0}")]
    OrderNotFound(Uuid),

    #[error("Parts not found: {}", format_ids(.missing))]
    PartsNotFound { missing: Vec<Uuid> },

    #[error("Order {0} is already paid")]
    AlreadyPaid(Uuid),

    #[error("Order {order_id} in status {status} cannot be paid")]
    NotPayable { order_id: Uuid, status: OrderStatus },

    #[error("Order {order_id} in status {status} cannot be cancelled")]
    CannotCancelPaid { order_id: Uuid, status: OrderStatus },

    #[error("Inventory unavailable: {0}")]
    InventoryUnavailable(ClientError),

    #[error("Payment failed: {0}")]
    PaymentFailed(ClientError),

    #[error("Order creation failed: {0}")]
    CreateFailed(String),

    #[error("Order update failed: {0}")]
    UpdateFailed(String),

    #[error("Order lookup failed: {0}")]
    GetFailed(String),

    #[error("Order {0} was modified concurrently")]
    ConcurrentModification(Uuid),
}

fn format_ids(ids: &[Uuid]) -> String {
    ids.iter()
        .map(Uuid::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl OrderError {
    /// Stable machine-readable code, used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            OrderError::EmptyParts => "EMPTY_PARTS",
            OrderError::InvalidPaymentMethod(_) => "INVALID_PAYMENT_METHOD",
            OrderError::InvalidArgument(_) => "INVALID_ARGUMENT",
            OrderError::OrderNotFound(_) => "ORDER_NOT_FOUND",
            OrderError::PartsNotFound { .. } => "PARTS_NOT_FOUND",
            OrderError::AlreadyPaid(_) => "ALREADY_PAID",
            OrderError::NotPayable { .. } => "NOT_PAYABLE",
            OrderError::CannotCancelPaid { .. } => "CANNOT_CANCEL_PAID",
            OrderError::InventoryUnavailable(_) => "INVENTORY_UNAVAILABLE",
            OrderError::PaymentFailed(_) => "PAYMENT_FAILED",
            OrderError::CreateFailed(_) => "CREATE_FAILED",
            OrderError::UpdateFailed(_) => "UPDATE_FAILED",
            OrderError::GetFailed(_) => "GET_FAILED",
            OrderError::ConcurrentModification(_) => "CONCURRENT_MODIFICATION",
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            OrderError::EmptyParts
            | OrderError::InvalidPaymentMethod(_)
            | OrderError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            OrderError::OrderNotFound(_) | OrderError::PartsNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            OrderError::AlreadyPaid(_)
            | OrderError::NotPayable { .. }
            | OrderError::CannotCancelPaid { .. }
            | OrderError::ConcurrentModification(_) => StatusCode::CONFLICT,
            OrderError::InventoryUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            OrderError::PaymentFailed(_)
            | OrderError::CreateFailed(_)
            | OrderError::UpdateFailed(_)
            | OrderError::GetFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<OrderError> for Status {
    fn from(err: OrderError) -> Self {
        let message = err.to_string();
        match err {
            OrderError::EmptyParts
            | OrderError::InvalidPaymentMethod(_)
            | OrderError::InvalidArgument(_) => Status::invalid_argument(message),
            OrderError::OrderNotFound(_) | OrderError::PartsNotFound { .. } => {
                Status::not_found(message)
            }
            OrderError::AlreadyPaid(_)
            | OrderError::NotPayable { .. }
            | OrderError::CannotCancelPaid { .. } => Status::failed_precondition(message),
            OrderError::ConcurrentModification(_) => Status::aborted(message),
            OrderError::InventoryUnavailable(_) => Status::unavailable(message),
            OrderError::PaymentFailed(_)
            | OrderError::CreateFailed(_)
            | OrderError::UpdateFailed(_)
            | OrderError::GetFailed(_) => Status::internal(message),
        }
    }
}
