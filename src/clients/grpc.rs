//! gRPC clients for Inventory, Payment and IAM.
//!
//! Each client wraps a tonic channel; the generated client is cloned per
//! call since the channel is pooled and cheap to clone.

use std::time::Duration;

use async_trait::async_trait;
use tonic::transport::Channel;
use uuid::Uuid;

use super::convert::{
    filter_to_proto, identity_from_proto, part_from_proto, payment_method_to_proto,
};
use super::{ClientError, IamClient, InventoryClient, PaymentClient, PaymentRequest, Result};
use crate::domain::{Identity, Part, PartsFilter};
use crate::proto::iam::v1::{iam_service_client::IamServiceClient, WhoamiRequest};
use crate::proto::inventory::v1::{
    inventory_service_client::InventoryServiceClient, GetPartRequest, ListPartsRequest,
};
use crate::proto::payment::v1::{payment_service_client::PaymentServiceClient, PayOrderRequest};
use crate::utils::bootstrap::connect_with_retry;

/// Inventory over gRPC.
#[derive(Clone)]
pub struct GrpcInventoryClient {
    client: InventoryServiceClient<Channel>,
}

impl GrpcInventoryClient {
    pub fn new(channel: Channel) -> Self {
        Self {
            client: InventoryServiceClient::new(channel),
        }
    }

    /// Connect with retry; every request is bounded by `request_timeout`.
    pub async fn connect(address: &str, request_timeout: Duration) -> Result<Self> {
        let channel = connect_with_retry("inventory", address, request_timeout).await?;
        Ok(Self::new(channel))
    }
}

#[async_trait]
impl InventoryClient for GrpcInventoryClient {
    async fn list_parts(&self, filter: &PartsFilter) -> Result<Vec<Part>> {
        let mut client = self.client.clone();
        let response = client
            .list_parts(ListPartsRequest {
                filter: Some(filter_to_proto(filter)),
            })
            .await?
            .into_inner();

        response
            .parts
            .into_iter()
            .map(|p| part_from_proto(p).map_err(|e| ClientError::Internal(e.to_string())))
            .collect()
    }

    async fn get_part(&self, part_id: Uuid) -> Result<Part> {
        let mut client = self.client.clone();
        let response = client
            .get_part(GetPartRequest {
                uuid: part_id.to_string(),
            })
            .await?
            .into_inner();

        let part = response
            .part
            .ok_or_else(|| ClientError::Internal("get_part response without part".to_string()))?;
        part_from_proto(part).map_err(|e| ClientError::Internal(e.to_string()))
    }
}

/// Payment over gRPC.
#[derive(Clone)]
pub struct GrpcPaymentClient {
    client: PaymentServiceClient<Channel>,
}

impl GrpcPaymentClient {
    pub fn new(channel: Channel) -> Self {
        Self {
            client: PaymentServiceClient::new(channel),
        }
    }

    pub async fn connect(address: &str, request_timeout: Duration) -> Result<Self> {
        let channel = connect_with_retry("payment", address, request_timeout).await?;
        Ok(Self::new(channel))
    }
}

#[async_trait]
impl PaymentClient for GrpcPaymentClient {
    async fn pay_order(&self, request: PaymentRequest) -> Result<String> {
        let mut client = self.client.clone();
        let response = client
            .pay_order(PayOrderRequest {
                order_uuid: request.order_id.to_string(),
                user_uuid: request.user_id.to_string(),
                payment_method: payment_method_to_proto(request.method) as i32,
                idempotency_key: request.idempotency_key,
            })
            .await?
            .into_inner();

        if response.transaction_uuid.is_empty() {
            return Err(ClientError::Internal(
                "payment returned an empty transaction id".to_string(),
            ));
        }
        Ok(response.transaction_uuid)
    }
}

/// IAM over gRPC.
#[derive(Clone)]
pub struct GrpcIamClient {
    client: IamServiceClient<Channel>,
}

impl GrpcIamClient {
    pub fn new(channel: Channel) -> Self {
        Self {
            client: IamServiceClient::new(channel),
        }
    }

    pub async fn connect(address: &str, request_timeout: Duration) -> Result<Self> {
        let channel = connect_with_retry("iam", address, request_timeout).await?;
        Ok(Self::new(channel))
    }
}

#[async_trait]
impl IamClient for GrpcIamClient {
    async fn whoami(&self, session_id: Uuid) -> Result<Identity> {
        let mut client = self.client.clone();
        let response = client
            .whoami(WhoamiRequest {
                session_uuid: session_id.to_string(),
            })
            .await?
            .into_inner();

        identity_from_proto(response)
    }
}
