//! Unified SQL order store.
//!
//! Uses a macro to generate the trait implementations for each SQL backend,
//! so PostgreSQL and SQLite share one body of code.

use std::marker::PhantomData;

use super::SqlDatabase;

/// SQL-based implementation of `OrderRepository` and `OutboxStore`.
pub struct SqlOrderStore<DB: SqlDatabase> {
    pool: DB::Pool,
    _marker: PhantomData<DB>,
}

impl<DB: SqlDatabase> SqlOrderStore<DB> {
    /// Create a new SQL order store with the given pool.
    pub fn new(pool: DB::Pool) -> Self {
        Self {
            pool,
            _marker: PhantomData,
        }
    }

    /// Get the underlying pool.
    pub fn pool(&self) -> &DB::Pool {
        &self.pool
    }
}

/// Implements the storage traits for a specific SQL backend.
macro_rules! impl_order_store {
    ($db_type:ty, $feature:literal) => {
        #[cfg(feature = $feature)]
        impl SqlOrderStore<$db_type> {
            /// Create tables and indexes if missing.
            pub async fn init(&self) -> crate::storage::Result<()> {
                sqlx::raw_sql(<$db_type as SqlDatabase>::CREATE_TABLES)
                    .execute(&self.pool)
                    .await?;
                Ok(())
            }

            async fn apply_update(
                &self,
                order_id: uuid::Uuid,
                order: &crate::domain::Order,
                records: Vec<crate::storage::OutboxRecord>,
            ) -> crate::storage::Result<crate::domain::Order> {
                use sqlx::Row;

                use super::query;
                use crate::storage::StorageError;

                let mut tx = self.pool.begin().await?;

                let (sql, values) = <$db_type>::build(&query::update_order(order_id, order));
                let result = sqlx::query_with(&sql, values).execute(&mut *tx).await?;

                if result.rows_affected() == 0 {
                    let (sql, values) = <$db_type>::build(&query::select_version(order_id));
                    let row = sqlx::query_with(&sql, values)
                        .fetch_optional(&mut *tx)
                        .await?;
                    return Err(match row {
                        None => StorageError::NotFound(order_id),
                        Some(row) => StorageError::Conflict {
                            order_id,
                            expected: order.version,
                            actual: row.try_get("version")?,
                        },
                    });
                }

                let (sql, values) = <$db_type>::build(&query::select_parts(order_id));
                let stored: Vec<String> = sqlx::query_with(&sql, values)
                    .fetch_all(&mut *tx)
                    .await?
                    .iter()
                    .map(|row| row.try_get("part_id"))
                    .collect::<Result<_, sqlx::Error>>()?;
                let wanted: Vec<String> = order.part_ids.iter().map(|p| p.to_string()).collect();

                if stored != wanted {
                    let (sql, values) = <$db_type>::build(&query::delete_parts(order_id));
                    sqlx::query_with(&sql, values).execute(&mut *tx).await?;
                    if let Some(stmt) = query::insert_parts(order_id, &order.part_ids) {
                        let (sql, values) = <$db_type>::build(&stmt);
                        sqlx::query_with(&sql, values).execute(&mut *tx).await?;
                    }
                }

                for record in &records {
                    let (sql, values) = <$db_type>::build(&query::insert_outbox(record));
                    sqlx::query_with(&sql, values).execute(&mut *tx).await?;
                }

                tx.commit().await?;

                let mut updated = order.clone();
                updated.order_id = order_id;
                updated.version = order.version + 1;
                Ok(updated)
            }
        }

        #[cfg(feature = $feature)]
        #[async_trait::async_trait]
        impl crate::storage::OrderRepository for SqlOrderStore<$db_type> {
            async fn create(&self, order: &crate::domain::Order) -> crate::storage::Result<()> {
                use super::query;
                use crate::storage::StorageError;

                let mut tx = self.pool.begin().await?;

                let (sql, values) = <$db_type>::build(&query::insert_order(order));
                match sqlx::query_with(&sql, values).execute(&mut *tx).await {
                    Ok(_) => {}
                    Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                        return Err(StorageError::Duplicate(order.order_id));
                    }
                    Err(e) => return Err(e.into()),
                }

                if let Some(stmt) = query::insert_parts(order.order_id, &order.part_ids) {
                    let (sql, values) = <$db_type>::build(&stmt);
                    sqlx::query_with(&sql, values).execute(&mut *tx).await?;
                }

                tx.commit().await?;
                Ok(())
            }

            async fn get(&self, order_id: uuid::Uuid) -> crate::storage::Result<crate::domain::Order> {
                use sqlx::Row;

                use super::query::{self, OrderRow};
                use crate::storage::StorageError;

                // Order row and part rows come from one snapshot.
                let mut tx = self.pool.begin().await?;

                let (sql, values) = <$db_type>::build(&query::select_order(order_id));
                let row = sqlx::query_with(&sql, values)
                    .fetch_optional(&mut *tx)
                    .await?
                    .ok_or(StorageError::NotFound(order_id))?;

                let order_row = OrderRow {
                    order_id: row.try_get("order_id")?,
                    user_id: row.try_get("user_id")?,
                    total_price: row.try_get("total_price")?,
                    status: row.try_get("status")?,
                    transaction_id: row.try_get("transaction_id")?,
                    payment_method: row.try_get("payment_method")?,
                    created_at: row.try_get("created_at")?,
                    updated_at: row.try_get("updated_at")?,
                    version: row.try_get("version")?,
                };

                let (sql, values) = <$db_type>::build(&query::select_parts(order_id));
                let part_ids = sqlx::query_with(&sql, values)
                    .fetch_all(&mut *tx)
                    .await?
                    .iter()
                    .map(|row| row.try_get("part_id"))
                    .collect::<Result<Vec<String>, sqlx::Error>>()?;

                tx.commit().await?;
                order_row.into_order(part_ids)
            }

            async fn update(
                &self,
                order_id: uuid::Uuid,
                order: &crate::domain::Order,
            ) -> crate::storage::Result<crate::domain::Order> {
                self.apply_update(order_id, order, Vec::new()).await
            }

            async fn update_with_outbox(
                &self,
                order_id: uuid::Uuid,
                order: &crate::domain::Order,
                records: Vec<crate::storage::OutboxRecord>,
            ) -> crate::storage::Result<crate::domain::Order> {
                self.apply_update(order_id, order, records).await
            }
        }

        #[cfg(feature = $feature)]
        #[async_trait::async_trait]
        impl crate::storage::OutboxStore for SqlOrderStore<$db_type> {
            async fn pending(
                &self,
                limit: usize,
            ) -> crate::storage::Result<Vec<crate::storage::OutboxRecord>> {
                use sqlx::Row;

                use super::query::{self, OutboxRow};

                let (sql, values) = <$db_type>::build(&query::select_pending(limit));
                let rows = sqlx::query_with(&sql, values).fetch_all(&self.pool).await?;

                rows.iter()
                    .map(|row| {
                        OutboxRow {
                            id: row.try_get("id")?,
                            kind: row.try_get("kind")?,
                            topic: row.try_get("topic")?,
                            key: row.try_get("message_key")?,
                            payload: row.try_get("payload")?,
                            created_at: row.try_get("created_at")?,
                            attempts: row.try_get("attempts")?,
                        }
                        .into_record()
                    })
                    .collect()
            }

            async fn mark_published(&self, id: uuid::Uuid) -> crate::storage::Result<()> {
                use super::query;
                use crate::storage::StorageError;

                let (sql, values) =
                    <$db_type>::build(&query::mark_published(id, &chrono::Utc::now()));
                let result = sqlx::query_with(&sql, values).execute(&self.pool).await?;
                if result.rows_affected() == 0 {
                    return Err(StorageError::OutboxRecordNotFound(id));
                }
                Ok(())
            }

            async fn record_failure(&self, id: uuid::Uuid) -> crate::storage::Result<()> {
                use super::query;
                use crate::storage::StorageError;

                let (sql, values) = <$db_type>::build(&query::record_failure(id));
                let result = sqlx::query_with(&sql, values).execute(&self.pool).await?;
                if result.rows_affected() == 0 {
                    return Err(StorageError::OutboxRecordNotFound(id));
                }
                Ok(())
            }
        }
    };
}

#[cfg(feature = "postgres")]
impl_order_store!(super::postgres::Postgres, "postgres");

#[cfg(feature = "sqlite")]
impl_order_store!(super::sqlite::Sqlite, "sqlite");

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::super::sqlite::{connect, SqliteOrderStore};
    use crate::domain::{EventKind, Order, OrderStatus, PaymentMethod};
    use crate::storage::{OrderRepository, OutboxRecord, OutboxStore, SqliteConfig, StorageError};

    async fn store(dir: &tempfile::TempDir) -> SqliteOrderStore {
        let path = dir.path().join("orders.db");
        connect(&SqliteConfig {
            path: path.to_string_lossy().into_owned(),
        })
        .await
        .unwrap()
    }

    fn order() -> Order {
        let part = Uuid::new_v4();
        Order::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            vec![part, Uuid::new_v4(), part],
            450,
            Utc::now(),
        )
    }

    fn record(order: &Order) -> OutboxRecord {
        OutboxRecord {
            id: Uuid::new_v4(),
            kind: EventKind::OrderPaid,
            topic: "order.paid".to_string(),
            key: order.order_id.as_bytes().to_vec(),
            payload: vec![0x0a, 0x01],
            created_at: Utc::now(),
            attempts: 0,
        }
    }

    #[tokio::test]
    async fn test_round_trip_preserves_part_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        let order = order();

        store.create(&order).await.unwrap();
        let loaded = store.get(order.order_id).await.unwrap();

        assert_eq!(loaded.part_ids, order.part_ids);
        assert_eq!(loaded.total_price, 450);
        assert_eq!(loaded.status, OrderStatus::PendingPayment);
        assert_eq!(loaded.version, 1);
    }

    #[tokio::test]
    async fn test_duplicate_create() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        let order = order();

        store.create(&order).await.unwrap();
        assert!(matches!(
            store.create(&order).await,
            Err(StorageError::Duplicate(_))
        ));
    }

    #[tokio::test]
    async fn test_get_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        assert!(matches!(
            store.get(Uuid::new_v4()).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_with_outbox_commits_both() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        let mut order = order();
        store.create(&order).await.unwrap();

        order
            .pay("tx-1".to_string(), PaymentMethod::CreditCard, Utc::now())
            .unwrap();
        let record = record(&order);
        let updated = store
            .update_with_outbox(order.order_id, &order, vec![record.clone()])
            .await
            .unwrap();
        assert_eq!(updated.version, 2);

        let loaded = store.get(order.order_id).await.unwrap();
        assert_eq!(loaded.status, OrderStatus::Paid);
        assert_eq!(loaded.transaction_id.as_deref(), Some("tx-1"));
        assert_eq!(loaded.payment_method, Some(PaymentMethod::CreditCard));
        assert_eq!(loaded.version, 2);

        let pending = store.pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, record.id);
        assert_eq!(pending[0].payload, record.payload);
    }

    #[tokio::test]
    async fn test_get_sees_replaced_parts_with_their_version() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        let mut order = order();
        store.create(&order).await.unwrap();

        let replacement = vec![Uuid::new_v4()];
        order.part_ids = replacement.clone();
        store.update(order.order_id, &order).await.unwrap();

        let loaded = store.get(order.order_id).await.unwrap();
        assert_eq!(loaded.version, 2);
        assert_eq!(loaded.part_ids, replacement);

        // a failed lookup leaves no open transaction behind
        assert!(store.get(Uuid::new_v4()).await.is_err());
        assert_eq!(store.get(order.order_id).await.unwrap(), loaded);
    }

    #[tokio::test]
    async fn test_stale_update_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        let order = order();
        store.create(&order).await.unwrap();

        let mut first = order.clone();
        first.cancel(Utc::now()).unwrap();
        store.update(order.order_id, &first).await.unwrap();

        let mut stale = order.clone();
        stale
            .pay("tx-2".to_string(), PaymentMethod::Card, Utc::now())
            .unwrap();
        let err = store
            .update_with_outbox(order.order_id, &stale, vec![record(&order)])
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            StorageError::Conflict {
                expected: 1,
                actual: 2,
                ..
            }
        ));
        assert!(store.pending(10).await.unwrap().is_empty());
        assert_eq!(
            store.get(order.order_id).await.unwrap().status,
            OrderStatus::Cancelled
        );
    }

    #[tokio::test]
    async fn test_update_missing_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        let order = order();
        assert!(matches!(
            store.update(order.order_id, &order).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_outbox_publish_and_failure() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        let order = order();
        store.create(&order).await.unwrap();

        let (a, b) = (record(&order), record(&order));
        store
            .update_with_outbox(order.order_id, &order, vec![a.clone(), b.clone()])
            .await
            .unwrap();

        store.record_failure(a.id).await.unwrap();
        store.record_failure(a.id).await.unwrap();
        let pending = store.pending(10).await.unwrap();
        let first = pending.iter().find(|r| r.id == a.id).unwrap();
        assert_eq!(first.attempts, 2);

        store.mark_published(a.id).await.unwrap();
        let pending = store.pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, b.id);

        assert!(matches!(
            store.mark_published(Uuid::new_v4()).await,
            Err(StorageError::OutboxRecordNotFound(_))
        ));
    }
}
