//! Clients for the services the Order service depends on.
//!
//! Inventory, Payment and IAM are reached through the traits below. The
//! gRPC implementations live in [`grpc`]; the in-memory services in
//! `crate::services` implement the same traits, so standalone mode and
//! distributed mode share all calling code.

use async_trait::async_trait;
use tonic::{Code, Status};
use uuid::Uuid;

use crate::domain::{Identity, Part, PartsFilter, PaymentMethod};

pub mod convert;
pub mod grpc;
pub mod mock;

pub use grpc::{GrpcIamClient, GrpcInventoryClient, GrpcPaymentClient};

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur during client operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Internal error: {0}")]
    Internal(String),

    /// Failed to establish a connection to the server.
    #[error("Connection failed: {0}")]
    Connection(String),
}

impl From<Status> for ClientError {
    fn from(status: Status) -> Self {
        let message = status.message().to_string();
        match status.code() {
            Code::Unavailable => ClientError::Unavailable(message),
            Code::DeadlineExceeded => ClientError::DeadlineExceeded(message),
            Code::InvalidArgument => ClientError::InvalidArgument(message),
            Code::NotFound => ClientError::NotFound(message),
            Code::Unauthenticated => ClientError::Unauthenticated(message),
            _ => ClientError::Internal(message),
        }
    }
}

impl From<tonic::transport::Error> for ClientError {
    fn from(err: tonic::transport::Error) -> Self {
        ClientError::Connection(err.to_string())
    }
}

impl From<ClientError> for Status {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Unavailable(msg) | ClientError::Connection(msg) => {
                Status::unavailable(msg)
            }
            ClientError::DeadlineExceeded(msg) => Status::deadline_exceeded(msg),
            ClientError::InvalidArgument(msg) => Status::invalid_argument(msg),
            ClientError::NotFound(msg) => Status::not_found(msg),
            ClientError::Unauthenticated(msg) => Status::unauthenticated(msg),
            ClientError::Internal(msg) => Status::internal(msg),
        }
    }
}

impl ClientError {
    /// Returns true for failures that may succeed when retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ClientError::Unavailable(_)
                | ClientError::DeadlineExceeded(_)
                | ClientError::Connection(_)
        )
    }
}

/// A charge request sent to the Payment service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub method: PaymentMethod,
    /// Repeated requests with the same key return the same transaction.
    pub idempotency_key: String,
}

/// Read access to the parts catalog.
#[async_trait]
pub trait InventoryClient: Send + Sync {
    /// Parts matching the filter, in catalog order.
    async fn list_parts(&self, filter: &PartsFilter) -> Result<Vec<Part>>;

    async fn get_part(&self, part_id: Uuid) -> Result<Part>;
}

/// Charges orders.
#[async_trait]
pub trait PaymentClient: Send + Sync {
    /// Returns the transaction id.
    async fn pay_order(&self, request: PaymentRequest) -> Result<String>;
}

/// Session lookup.
#[async_trait]
pub trait IamClient: Send + Sync {
    /// Resolve a live session to its user. Unknown or expired sessions are
    /// `NotFound`.
    async fn whoami(&self, session_id: Uuid) -> Result<Identity>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_mapping() {
        assert_eq!(
            ClientError::from(Status::unavailable("down")),
            ClientError::Unavailable("down".to_string())
        );
        assert_eq!(
            ClientError::from(Status::deadline_exceeded("slow")),
            ClientError::DeadlineExceeded("slow".to_string())
        );
        assert_eq!(
            ClientError::from(Status::not_found("no session")),
            ClientError::NotFound("no session".to_string())
        );
        assert_eq!(
            ClientError::from(Status::unauthenticated("who")),
            ClientError::Unauthenticated("who".to_string())
        );
        assert_eq!(
            ClientError::from(Status::permission_denied("nope")),
            ClientError::Internal("nope".to_string())
        );
    }

    #[test]
    fn test_back_to_status() {
        let status: Status = ClientError::InvalidArgument("bad method".to_string()).into();
        assert_eq!(status.code(), Code::InvalidArgument);
        let status: Status = ClientError::Connection("refused".to_string()).into();
        assert_eq!(status.code(), Code::Unavailable);
    }

    #[test]
    fn test_transient() {
        assert!(ClientError::Unavailable(String::new()).is_transient());
        assert!(ClientError::Connection(String::new()).is_transient());
        assert!(!ClientError::NotFound(String::new()).is_transient());
    }
}
