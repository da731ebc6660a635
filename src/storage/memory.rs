//! In-memory order store.
//!
//! A single `RwLock` guards orders and outbox together, so an update and its
//! outbox records become visible atomically.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{OrderRepository, OutboxRecord, OutboxStore, Result, StorageError};
use crate::domain::Order;

#[derive(Default)]
struct State {
    orders: HashMap<Uuid, Order>,
    /// Unpublished records only. Insertion order is publication order.
    outbox: Vec<OutboxRecord>,
}

#[derive(Default)]
struct Faults {
    fail_on_get: bool,
    fail_on_update: bool,
    duplicate_creates: usize,
}

/// In-memory implementation of [`OrderRepository`] and [`OutboxStore`].
#[derive(Default)]
pub struct InMemoryOrderStore {
    state: RwLock<State>,
    faults: RwLock<Faults>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `get` fail with `Unavailable`.
    pub async fn set_fail_on_get(&self, fail: bool) {
        self.faults.write().await.fail_on_get = fail;
    }

    /// Make `update` and `update_with_outbox` fail with `Unavailable`.
    pub async fn set_fail_on_update(&self, fail: bool) {
        self.faults.write().await.fail_on_update = fail;
    }

    /// Report the next `count` creates as `Duplicate`.
    pub async fn set_duplicate_creates(&self, count: usize) {
        self.faults.write().await.duplicate_creates = count;
    }

    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Outbox records still retained, i.e. not yet published.
    pub async fn outbox_records(&self) -> Vec<OutboxRecord> {
        self.state.read().await.outbox.clone()
    }

    async fn apply_update(
        &self,
        order_id: Uuid,
        order: &Order,
        records: Vec<OutboxRecord>,
    ) -> Result<Order> {
        if self.faults.read().await.fail_on_update {
            return Err(StorageError::Unavailable("injected update failure".to_string()));
        }

        let mut state = self.state.write().await;
        let stored = state
            .orders
            .get_mut(&order_id)
            .ok_or(StorageError::NotFound(order_id))?;

        if stored.version != order.version {
            return Err(StorageError::Conflict {
                order_id,
                expected: order.version,
                actual: stored.version,
            });
        }

        stored.status = order.status;
        stored.transaction_id = order.transaction_id.clone();
        stored.payment_method = order.payment_method;
        stored.updated_at = order.updated_at;
        if stored.part_ids != order.part_ids {
            stored.part_ids = order.part_ids.clone();
        }
        stored.version += 1;
        let updated = stored.clone();

        state.outbox.extend(records);

        Ok(updated)
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderStore {
    async fn create(&self, order: &Order) -> Result<()> {
        {
            let mut faults = self.faults.write().await;
            if faults.duplicate_creates > 0 {
                faults.duplicate_creates -= 1;
                return Err(StorageError::Duplicate(order.order_id));
            }
        }

        let mut state = self.state.write().await;
        if state.orders.contains_key(&order.order_id) {
            return Err(StorageError::Duplicate(order.order_id));
        }
        state.orders.insert(order.order_id, order.clone());
        Ok(())
    }

    async fn get(&self, order_id: Uuid) -> Result<Order> {
        if self.faults.read().await.fail_on_get {
            return Err(StorageError::Unavailable("injected get failure".to_string()));
        }
        self.state
            .read()
            .await
            .orders
            .get(&order_id)
            .cloned()
            .ok_or(StorageError::NotFound(order_id))
    }

    async fn update(&self, order_id: Uuid, order: &Order) -> Result<Order> {
        self.apply_update(order_id, order, Vec::new()).await
    }

    async fn update_with_outbox(
        &self,
        order_id: Uuid,
        order: &Order,
        records: Vec<OutboxRecord>,
    ) -> Result<Order> {
        self.apply_update(order_id, order, records).await
    }
}

#[async_trait]
impl OutboxStore for InMemoryOrderStore {
    async fn pending(&self, limit: usize) -> Result<Vec<OutboxRecord>> {
        Ok(self
            .state
            .read()
            .await
            .outbox
            .iter()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_published(&self, id: Uuid) -> Result<()> {
        let mut state = self.state.write().await;
        let index = state
            .outbox
            .iter()
            .position(|r| r.id == id)
            .ok_or(StorageError::OutboxRecordNotFound(id))?;
        state.outbox.remove(index);
        Ok(())
    }

    async fn record_failure(&self, id: Uuid) -> Result<()> {
        let mut state = self.state.write().await;
        let record = state
            .outbox
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(StorageError::OutboxRecordNotFound(id))?;
        record.attempts += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EventKind, OrderStatus, PaymentMethod};
    use chrono::Utc;

    fn order() -> Order {
        Order::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            vec![Uuid::new_v4(), Uuid::new_v4()],
            300,
            Utc::now(),
        )
    }

    fn record() -> OutboxRecord {
        OutboxRecord {
            id: Uuid::new_v4(),
            kind: EventKind::OrderPaid,
            topic: "order.paid".to_string(),
            key: vec![1],
            payload: vec![2],
            created_at: Utc::now(),
            attempts: 0,
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = InMemoryOrderStore::new();
        let order = order();
        store.create(&order).await.unwrap();
        assert_eq!(store.get(order.order_id).await.unwrap(), order);
    }

    #[tokio::test]
    async fn test_create_duplicate() {
        let store = InMemoryOrderStore::new();
        let order = order();
        store.create(&order).await.unwrap();
        assert!(matches!(
            store.create(&order).await,
            Err(StorageError::Duplicate(id)) if id == order.order_id
        ));
    }

    #[tokio::test]
    async fn test_get_missing() {
        let store = InMemoryOrderStore::new();
        assert!(matches!(
            store.get(Uuid::new_v4()).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_bumps_version() {
        let store = InMemoryOrderStore::new();
        let mut order = order();
        store.create(&order).await.unwrap();

        order
            .pay("tx".to_string(), PaymentMethod::Card, Utc::now())
            .unwrap();
        let updated = store.update(order.order_id, &order).await.unwrap();

        assert_eq!(updated.version, 2);
        assert_eq!(updated.status, OrderStatus::Paid);
        assert_eq!(store.get(order.order_id).await.unwrap(), updated);
    }

    #[tokio::test]
    async fn test_stale_update_conflicts() {
        let store = InMemoryOrderStore::new();
        let order = order();
        store.create(&order).await.unwrap();

        let mut first = order.clone();
        first.cancel(Utc::now()).unwrap();
        store.update(order.order_id, &first).await.unwrap();

        let mut second = order.clone();
        second
            .pay("tx".to_string(), PaymentMethod::Sbp, Utc::now())
            .unwrap();
        let err = store.update(order.order_id, &second).await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::Conflict {
                expected: 1,
                actual: 2,
                ..
            }
        ));
        assert_eq!(
            store.get(order.order_id).await.unwrap().status,
            OrderStatus::Cancelled
        );
    }

    #[tokio::test]
    async fn test_update_missing() {
        let store = InMemoryOrderStore::new();
        let order = order();
        assert!(matches!(
            store.update(order.order_id, &order).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_update_writes_no_outbox() {
        let store = InMemoryOrderStore::new();
        let order = order();
        store.create(&order).await.unwrap();

        let mut stale = order.clone();
        stale.version = 7;
        assert!(store
            .update_with_outbox(order.order_id, &stale, vec![record()])
            .await
            .is_err());
        assert!(store.pending(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_outbox_lifecycle() {
        let store = InMemoryOrderStore::new();
        let order = order();
        store.create(&order).await.unwrap();

        let (a, b) = (record(), record());
        store
            .update_with_outbox(order.order_id, &order, vec![a.clone(), b.clone()])
            .await
            .unwrap();

        let pending = store.pending(10).await.unwrap();
        assert_eq!(pending, vec![a.clone(), b.clone()]);

        store.record_failure(a.id).await.unwrap();
        assert_eq!(store.pending(1).await.unwrap()[0].attempts, 1);

        store.mark_published(a.id).await.unwrap();
        let pending = store.pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, b.id);
    }

    #[tokio::test]
    async fn test_published_records_are_not_retained() {
        let store = InMemoryOrderStore::new();
        let mut order = order();
        store.create(&order).await.unwrap();

        for _ in 0..50 {
            let records = vec![record()];
            let ids: Vec<Uuid> = records.iter().map(|r| r.id).collect();
            order = store
                .update_with_outbox(order.order_id, &order, records)
                .await
                .unwrap();
            for id in ids {
                store.mark_published(id).await.unwrap();
            }
        }

        assert!(store.outbox_records().await.is_empty());
        assert!(store.pending(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_published_twice_is_not_found() {
        let store = InMemoryOrderStore::new();
        let order = order();
        store.create(&order).await.unwrap();
        let a = record();
        store
            .update_with_outbox(order.order_id, &order, vec![a.clone()])
            .await
            .unwrap();

        store.mark_published(a.id).await.unwrap();
        assert!(matches!(
            store.mark_published(a.id).await,
            Err(StorageError::OutboxRecordNotFound(id)) if id == a.id
        ));
    }

    #[tokio::test]
    async fn test_mark_unknown_record() {
        let store = InMemoryOrderStore::new();
        assert!(matches!(
            store.mark_published(Uuid::new_v4()).await,
            Err(StorageError::OutboxRecordNotFound(_))
        ));
    }
}
