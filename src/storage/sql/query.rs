//! Backend-neutral statements and row conversion.

use chrono::{DateTime, SecondsFormat, Utc};
use sea_query::{
    DeleteStatement, Expr, InsertStatement, Order as SortOrder, Query, QueryBuilder,
    SelectStatement, UpdateStatement,
};
use sea_query_binder::{SqlxBinder, SqlxValues};
use uuid::Uuid;

use super::schema::{OrderParts, Orders, Outbox};
use crate::domain::{Order, OrderStatus, PaymentMethod};
use crate::storage::{OutboxRecord, Result, StorageError};

/// Trait for SQL database backends.
///
/// Abstracts over PostgreSQL and SQLite by providing the pool type, the DDL
/// and the query builder used to render statements.
pub trait SqlDatabase: Send + Sync + 'static {
    /// The connection pool type for this database.
    type Pool: Clone + Send + Sync;

    /// Schema creation script, safe to run repeatedly.
    const CREATE_TABLES: &'static str;

    /// The sea-query builder for this dialect.
    fn builder() -> impl QueryBuilder;

    /// Render a statement with bound parameters.
    fn build<S: SqlxBinder>(stmt: &S) -> (String, SqlxValues) {
        stmt.build_sqlx(Self::builder())
    }
}

/// Fixed-width RFC 3339 so text ordering matches time ordering.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StorageError::Corrupt(format!("{column}: {e}")))
}

fn parse_uuid(column: &str, value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| StorageError::Corrupt(format!("{column}: {e}")))
}

// ============================================================================
// Orders
// ============================================================================

pub fn insert_order(order: &Order) -> InsertStatement {
    Query::insert()
        .into_table(Orders::Table)
        .columns([
            Orders::OrderId,
            Orders::UserId,
            Orders::TotalPrice,
            Orders::Status,
            Orders::TransactionId,
            Orders::PaymentMethod,
            Orders::CreatedAt,
            Orders::UpdatedAt,
            Orders::Version,
        ])
        .values_panic([
            order.order_id.to_string().into(),
            order.user_id.to_string().into(),
            order.total_price.into(),
            order.status.as_str().into(),
            order.transaction_id.clone().into(),
            order.payment_method.map(|m| m.as_str().to_string()).into(),
            format_timestamp(&order.created_at).into(),
            format_timestamp(&order.updated_at).into(),
            order.version.into(),
        ])
        .to_owned()
}

/// Insert the order lines, or `None` for an empty list.
pub fn insert_parts(order_id: Uuid, part_ids: &[Uuid]) -> Option<InsertStatement> {
    if part_ids.is_empty() {
        return None;
    }
    let mut stmt = Query::insert()
        .into_table(OrderParts::Table)
        .columns([OrderParts::OrderId, OrderParts::Position, OrderParts::PartId])
        .to_owned();
    for (position, part_id) in part_ids.iter().enumerate() {
        stmt.values_panic([
            order_id.to_string().into(),
            (position as i64).into(),
            part_id.to_string().into(),
        ]);
    }
    Some(stmt)
}

pub fn delete_parts(order_id: Uuid) -> DeleteStatement {
    Query::delete()
        .from_table(OrderParts::Table)
        .and_where(Expr::col(OrderParts::OrderId).eq(order_id.to_string()))
        .to_owned()
}

pub fn select_order(order_id: Uuid) -> SelectStatement {
    Query::select()
        .columns([
            Orders::OrderId,
            Orders::UserId,
            Orders::TotalPrice,
            Orders::Status,
            Orders::TransactionId,
            Orders::PaymentMethod,
            Orders::CreatedAt,
            Orders::UpdatedAt,
            Orders::Version,
        ])
        .from(Orders::Table)
        .and_where(Expr::col(Orders::OrderId).eq(order_id.to_string()))
        .to_owned()
}

pub fn select_version(order_id: Uuid) -> SelectStatement {
    Query::select()
        .column(Orders::Version)
        .from(Orders::Table)
        .and_where(Expr::col(Orders::OrderId).eq(order_id.to_string()))
        .to_owned()
}

pub fn select_parts(order_id: Uuid) -> SelectStatement {
    Query::select()
        .column(OrderParts::PartId)
        .from(OrderParts::Table)
        .and_where(Expr::col(OrderParts::OrderId).eq(order_id.to_string()))
        .order_by(OrderParts::Position, SortOrder::Asc)
        .to_owned()
}

/// Compare-and-set update of the mutable columns.
pub fn update_order(order_id: Uuid, order: &Order) -> UpdateStatement {
    Query::update()
        .table(Orders::Table)
        .values([
            (Orders::Status, order.status.as_str().into()),
            (Orders::TransactionId, order.transaction_id.clone().into()),
            (
                Orders::PaymentMethod,
                order.payment_method.map(|m| m.as_str().to_string()).into(),
            ),
            (Orders::UpdatedAt, format_timestamp(&order.updated_at).into()),
            (Orders::Version, (order.version + 1).into()),
        ])
        .and_where(Expr::col(Orders::OrderId).eq(order_id.to_string()))
        .and_where(Expr::col(Orders::Version).eq(order.version))
        .to_owned()
}

/// Raw column values of an `orders` row.
pub struct OrderRow {
    pub order_id: String,
    pub user_id: String,
    pub total_price: i64,
    pub status: String,
    pub transaction_id: Option<String>,
    pub payment_method: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub version: i64,
}

impl OrderRow {
    pub fn into_order(self, part_ids: Vec<String>) -> Result<Order> {
        let status: OrderStatus = self
            .status
            .parse()
            .map_err(|e| StorageError::Corrupt(format!("status: {e}")))?;
        let payment_method = self
            .payment_method
            .map(|m| m.parse::<PaymentMethod>())
            .transpose()
            .map_err(|e| StorageError::Corrupt(format!("payment_method: {e}")))?;
        let part_ids = part_ids
            .iter()
            .map(|p| parse_uuid("part_id", p))
            .collect::<Result<Vec<_>>>()?;

        Ok(Order {
            order_id: parse_uuid("order_id", &self.order_id)?,
            user_id: parse_uuid("user_id", &self.user_id)?,
            part_ids,
            total_price: self.total_price,
            status,
            transaction_id: self.transaction_id,
            payment_method,
            created_at: parse_timestamp("created_at", &self.created_at)?,
            updated_at: parse_timestamp("updated_at", &self.updated_at)?,
            version: self.version,
        })
    }
}

// ============================================================================
// Outbox
// ============================================================================

pub fn insert_outbox(record: &OutboxRecord) -> InsertStatement {
    Query::insert()
        .into_table(Outbox::Table)
        .columns([
            Outbox::Id,
            Outbox::Kind,
            Outbox::Topic,
            Outbox::MessageKey,
            Outbox::Payload,
            Outbox::CreatedAt,
            Outbox::Attempts,
        ])
        .values_panic([
            record.id.to_string().into(),
            record.kind.as_str().into(),
            record.topic.clone().into(),
            record.key.clone().into(),
            record.payload.clone().into(),
            format_timestamp(&record.created_at).into(),
            i64::from(record.attempts).into(),
        ])
        .to_owned()
}

pub fn select_pending(limit: usize) -> SelectStatement {
    Query::select()
        .columns([
            Outbox::Id,
            Outbox::Kind,
            Outbox::Topic,
            Outbox::MessageKey,
            Outbox::Payload,
            Outbox::CreatedAt,
            Outbox::Attempts,
        ])
        .from(Outbox::Table)
        .and_where(Expr::col(Outbox::PublishedAt).is_null())
        .order_by(Outbox::CreatedAt, SortOrder::Asc)
        .order_by(Outbox::Id, SortOrder::Asc)
        .limit(limit as u64)
        .to_owned()
}

pub fn mark_published(id: Uuid, now: &DateTime<Utc>) -> UpdateStatement {
    Query::update()
        .table(Outbox::Table)
        .value(Outbox::PublishedAt, format_timestamp(now))
        .and_where(Expr::col(Outbox::Id).eq(id.to_string()))
        .to_owned()
}

pub fn record_failure(id: Uuid) -> UpdateStatement {
    Query::update()
        .table(Outbox::Table)
        .value(Outbox::Attempts, Expr::col(Outbox::Attempts).add(1))
        .and_where(Expr::col(Outbox::Id).eq(id.to_string()))
        .to_owned()
}

/// Raw column values of an `outbox` row.
pub struct OutboxRow {
    pub id: String,
    pub kind: String,
    pub topic: String,
    pub key: Vec<u8>,
    pub payload: Vec<u8>,
    pub created_at: String,
    pub attempts: i64,
}

impl OutboxRow {
    pub fn into_record(self) -> Result<OutboxRecord> {
        Ok(OutboxRecord {
            id: parse_uuid("id", &self.id)?,
            kind: self
                .kind
                .parse()
                .map_err(|e| StorageError::Corrupt(format!("kind: {e}")))?,
            topic: self.topic,
            key: self.key,
            payload: self.payload,
            created_at: parse_timestamp("created_at", &self.created_at)?,
            attempts: i32::try_from(self.attempts)
                .map_err(|e| StorageError::Corrupt(format!("attempts: {e}")))?,
        })
    }
}
