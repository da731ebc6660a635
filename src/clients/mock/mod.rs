//! Scriptable client mocks for testing.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ClientError, IamClient, InventoryClient, PaymentClient, PaymentRequest, Result};
use crate::domain::{Identity, Part, PartsFilter};

/// Mock inventory returning a fixed catalog.
#[derive(Default)]
pub struct MockInventoryClient {
    parts: RwLock<Vec<Part>>,
    fail_with: RwLock<Option<ClientError>>,
    list_calls: RwLock<Vec<PartsFilter>>,
}

impl MockInventoryClient {
    pub fn new(parts: Vec<Part>) -> Self {
        Self {
            parts: RwLock::new(parts),
            ..Default::default()
        }
    }

    /// Make every call fail with `err`; `None` restores normal behavior.
    pub async fn set_fail_with(&self, err: Option<ClientError>) {
        *self.fail_with.write().await = err;
    }

    pub async fn list_call_count(&self) -> usize {
        self.list_calls.read().await.len()
    }

    pub async fn list_calls(&self) -> Vec<PartsFilter> {
        self.list_calls.read().await.clone()
    }
}

#[async_trait]
impl InventoryClient for MockInventoryClient {
    async fn list_parts(&self, filter: &PartsFilter) -> Result<Vec<Part>> {
        self.list_calls.write().await.push(filter.clone());
        if let Some(err) = self.fail_with.read().await.clone() {
            return Err(err);
        }
        Ok(self
            .parts
            .read()
            .await
            .iter()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect())
    }

    async fn get_part(&self, part_id: Uuid) -> Result<Part> {
        if let Some(err) = self.fail_with.read().await.clone() {
            return Err(err);
        }
        self.parts
            .read()
            .await
            .iter()
            .find(|p| p.id == part_id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("part {part_id}")))
    }
}

/// Mock payment returning a fixed transaction id.
pub struct MockPaymentClient {
    transaction_id: RwLock<String>,
    fail_with: RwLock<Option<ClientError>>,
    requests: RwLock<Vec<PaymentRequest>>,
}

impl MockPaymentClient {
    pub fn new(transaction_id: impl Into<String>) -> Self {
        Self {
            transaction_id: RwLock::new(transaction_id.into()),
            fail_with: RwLock::new(None),
            requests: RwLock::new(Vec::new()),
        }
    }

    pub async fn set_fail_with(&self, err: Option<ClientError>) {
        *self.fail_with.write().await = err;
    }

    pub async fn set_transaction_id(&self, transaction_id: impl Into<String>) {
        *self.transaction_id.write().await = transaction_id.into();
    }

    pub async fn call_count(&self) -> usize {
        self.requests.read().await.len()
    }

    pub async fn requests(&self) -> Vec<PaymentRequest> {
        self.requests.read().await.clone()
    }
}

#[async_trait]
impl PaymentClient for MockPaymentClient {
    async fn pay_order(&self, request: PaymentRequest) -> Result<String> {
        self.requests.write().await.push(request);
        if let Some(err) = self.fail_with.read().await.clone() {
            return Err(err);
        }
        Ok(self.transaction_id.read().await.clone())
    }
}

/// Mock IAM with a fixed session table.
#[derive(Default)]
pub struct MockIamClient {
    identities: RwLock<HashMap<Uuid, Identity>>,
    fail_with: RwLock<Option<ClientError>>,
    calls: RwLock<Vec<Uuid>>,
}

impl MockIamClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, identity: Identity) {
        self.identities
            .write()
            .await
            .insert(identity.session.session_id, identity);
    }

    pub async fn set_fail_with(&self, err: Option<ClientError>) {
        *self.fail_with.write().await = err;
    }

    pub async fn call_count(&self) -> usize {
        self.calls.read().await.len()
    }
}

#[async_trait]
impl IamClient for MockIamClient {
    async fn whoami(&self, session_id: Uuid) -> Result<Identity> {
        self.calls.write().await.push(session_id);
        if let Some(err) = self.fail_with.read().await.clone() {
            return Err(err);
        }
        self.identities
            .read()
            .await
            .get(&session_id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("session {session_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Category, PaymentMethod};

    fn part(price: i64) -> Part {
        Part {
            id: Uuid::new_v4(),
            name: format!("part-{price}"),
            description: String::new(),
            price,
            stock_quantity: 1,
            category: Category::Wing,
            dimensions: None,
            manufacturer: None,
            tags: vec![],
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_inventory_filters_by_id() {
        let (a, b) = (part(100), part(200));
        let inventory = MockInventoryClient::new(vec![a.clone(), b]);

        let found = inventory
            .list_parts(&PartsFilter::by_ids([a.id]))
            .await
            .unwrap();

        assert_eq!(found, vec![a]);
        assert_eq!(inventory.list_call_count().await, 1);
    }

    #[tokio::test]
    async fn test_inventory_failure() {
        let inventory = MockInventoryClient::new(vec![]);
        inventory
            .set_fail_with(Some(ClientError::Unavailable("down".to_string())))
            .await;
        assert!(inventory.list_parts(&PartsFilter::default()).await.is_err());
    }

    #[tokio::test]
    async fn test_payment_records_requests() {
        let payment = MockPaymentClient::new("tx-1");
        let request = PaymentRequest {
            order_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            method: PaymentMethod::Card,
            idempotency_key: "k".to_string(),
        };

        assert_eq!(payment.pay_order(request.clone()).await.unwrap(), "tx-1");
        assert_eq!(payment.requests().await, vec![request]);
    }

    #[tokio::test]
    async fn test_iam_unknown_session() {
        let iam = MockIamClient::new();
        assert!(matches!(
            iam.whoami(Uuid::new_v4()).await,
            Err(ClientError::NotFound(_))
        ));
        assert_eq!(iam.call_count().await, 1);
    }
}
