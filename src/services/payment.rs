//! In-memory Payment service.
//!
//! Every charge succeeds and gets a fresh transaction id. Requests carrying
//! an idempotency key already seen return the original transaction.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tonic::{Request, Response, Status};
use tracing::info;
use uuid::Uuid;

use crate::clients::convert::{parse_uuid, payment_method_from_proto};
use crate::clients::{PaymentClient, PaymentRequest, Result};
use crate::proto::payment::v1::payment_service_server::PaymentService;
use crate::proto::payment::v1::{PayOrderRequest, PayOrderResponse};

#[derive(Default)]
pub struct PaymentGateway {
    /// idempotency key -> transaction id
    transactions: RwLock<HashMap<String, String>>,
}

impl PaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn transaction_count(&self) -> usize {
        self.transactions.read().await.len()
    }

    async fn charge(&self, request: &PaymentRequest) -> String {
        if request.idempotency_key.is_empty() {
            return Uuid::new_v4().to_string();
        }

        let mut transactions = self.transactions.write().await;
        if let Some(existing) = transactions.get(&request.idempotency_key) {
            info!(
                order_id = %request.order_id,
                transaction_id = %existing,
                "Repeated payment, returning original transaction"
            );
            return existing.clone();
        }

        let transaction_id = Uuid::new_v4().to_string();
        transactions.insert(request.idempotency_key.clone(), transaction_id.clone());
        info!(
            order_id = %request.order_id,
            user_id = %request.user_id,
            method = %request.method,
            transaction_id = %transaction_id,
            "Payment accepted"
        );
        transaction_id
    }
}

#[async_trait]
impl PaymentClient for PaymentGateway {
    async fn pay_order(&self, request: PaymentRequest) -> Result<String> {
        Ok(self.charge(&request).await)
    }
}

#[tonic::async_trait]
impl PaymentService for PaymentGateway {
    async fn pay_order(
        &self,
        request: Request<PayOrderRequest>,
    ) -> std::result::Result<Response<PayOrderResponse>, Status> {
        let request = request.into_inner();
        let request = PaymentRequest {
            order_id: parse_uuid("order_uuid", &request.order_uuid)?,
            user_id: parse_uuid("user_uuid", &request.user_uuid)?,
            method: payment_method_from_proto(request.payment_method)?,
            idempotency_key: request.idempotency_key,
        };

        Ok(Response::new(PayOrderResponse {
            transaction_uuid: self.charge(&request).await,
        }))
    }
}
