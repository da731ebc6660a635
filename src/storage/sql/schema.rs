//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building.

use sea_query::Iden;

/// Orders table schema.
#[derive(Iden)]
pub enum Orders {
    Table,
    #[iden = "order_id"]
    OrderId,
    #[iden = "user_id"]
    UserId,
    #[iden = "total_price"]
    TotalPrice,
    #[iden = "status"]
    Status,
    #[iden = "transaction_id"]
    TransactionId,
    #[iden = "payment_method"]
    PaymentMethod,
    #[iden = "created_at"]
    CreatedAt,
    #[iden = "updated_at"]
    UpdatedAt,
    #[iden = "version"]
    Version,
}

/// Order lines; one row per occurrence of a part in the order.
#[derive(Iden)]
pub enum OrderParts {
    Table,
    #[iden = "order_id"]
    OrderId,
    #[iden = "position"]
    Position,
    #[iden = "part_id"]
    PartId,
}

/// Outbox table schema.
#[derive(Iden)]
pub enum Outbox {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "kind"]
    Kind,
    #[iden = "topic"]
    Topic,
    #[iden = "message_key"]
    MessageKey,
    #[iden = "payload"]
    Payload,
    #[iden = "created_at"]
    CreatedAt,
    #[iden = "attempts"]
    Attempts,
    #[iden = "published_at"]
    PublishedAt,
}

/// SQLite DDL.
pub const SQLITE_CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS orders (
    order_id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    total_price INTEGER NOT NULL,
    status TEXT NOT NULL,
    transaction_id TEXT,
    payment_method TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    version INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS order_parts (
    order_id TEXT NOT NULL REFERENCES orders(order_id),
    position INTEGER NOT NULL,
    part_id TEXT NOT NULL,
    PRIMARY KEY (order_id, position)
);

CREATE TABLE IF NOT EXISTS outbox (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    topic TEXT NOT NULL,
    message_key BLOB NOT NULL,
    payload BLOB NOT NULL,
    created_at TEXT NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0,
    published_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_outbox_pending ON outbox(published_at, created_at);
"#;

/// PostgreSQL DDL.
pub const POSTGRES_CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS orders (
    order_id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    total_price BIGINT NOT NULL,
    status TEXT NOT NULL,
    transaction_id TEXT,
    payment_method TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    version BIGINT NOT NULL
);

CREATE TABLE IF NOT EXISTS order_parts (
    order_id TEXT NOT NULL REFERENCES orders(order_id),
    position BIGINT NOT NULL,
    part_id TEXT NOT NULL,
    PRIMARY KEY (order_id, position)
);

CREATE TABLE IF NOT EXISTS outbox (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    topic TEXT NOT NULL,
    message_key BYTEA NOT NULL,
    payload BYTEA NOT NULL,
    created_at TEXT NOT NULL,
    attempts BIGINT NOT NULL DEFAULT 0,
    published_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_outbox_pending ON outbox(published_at, created_at);
"#;
