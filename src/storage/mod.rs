//! Order persistence.
//!
//! The Order service depends only on the [`OrderRepository`] and
//! [`OutboxStore`] capabilities. Implementations:
//! - [`InMemoryOrderStore`]: single read-write lock over a map, for tests and
//!   throwaway standalone runs
//! - SQL stores (SQLite, PostgreSQL): sea-query statements executed with sqlx
//!   transactions
//!
//! Every mutating call is all-or-nothing. Dropping an in-flight future rolls
//! back any transaction it had open.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::domain::{EventKind, Order};

pub mod memory;
#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub mod sql;

pub use memory::InMemoryOrderStore;

// ============================================================================
// Errors
// ============================================================================

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Order not found: {0}")]
    NotFound(Uuid),

    #[error("Order already exists: {0}")]
    Duplicate(Uuid),

    #[error("Version conflict on order {order_id}: expected {expected}, found {actual}")]
    Conflict {
        order_id: Uuid,
        expected: i64,
        actual: i64,
    },

    #[error("Outbox record not found: {0}")]
    OutboxRecordNotFound(Uuid),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[cfg(any(feature = "sqlite", feature = "postgres"))]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

// ============================================================================
// Records
// ============================================================================

/// A pending event co-committed with an order update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxRecord {
    /// Equal to the event id.
    pub id: Uuid,
    pub kind: EventKind,
    pub topic: String,
    pub key: Vec<u8>,
    pub payload: Vec<u8>,
    pub created_at: DateTime<Utc>,
    /// Failed publish attempts so far.
    pub attempts: i32,
}

// ============================================================================
// Traits
// ============================================================================

/// Persistence capability for the order aggregate.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Insert an order and its part list. Fails with `Duplicate` if the id exists.
    async fn create(&self, order: &Order) -> Result<()>;

    /// Load the full aggregate, part list included.
    async fn get(&self, order_id: Uuid) -> Result<Order>;

    /// Replace the mutable fields and, if it changed, the part list.
    ///
    /// `order.version` must equal the stored version; the stored version is
    /// then bumped and the updated order returned.
    async fn update(&self, order_id: Uuid, order: &Order) -> Result<Order>;

    /// Same as [`update`](Self::update) and append outbox records in the
    /// same transaction.
    async fn update_with_outbox(
        &self,
        order_id: Uuid,
        order: &Order,
        records: Vec<OutboxRecord>,
    ) -> Result<Order>;
}

/// Pending-event table drained by the outbox relay.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Unpublished records, oldest first.
    async fn pending(&self, limit: usize) -> Result<Vec<OutboxRecord>>;

    async fn mark_published(&self, id: Uuid) -> Result<()>;

    async fn record_failure(&self, id: Uuid) -> Result<()>;
}

// ============================================================================
// Configuration
// ============================================================================

/// Storage type discriminator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    Memory,
    #[default]
    Sqlite,
    Postgres,
}

impl std::fmt::Display for StorageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageType::Memory => f.write_str("memory"),
            StorageType::Sqlite => f.write_str("sqlite"),
            StorageType::Postgres => f.write_str("postgres"),
        }
    }
}

/// Storage configuration (discriminated union).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage type discriminator.
    #[serde(rename = "type")]
    pub storage_type: StorageType,
    /// SQLite-specific configuration.
    pub sqlite: SqliteConfig,
    /// PostgreSQL-specific configuration.
    pub postgres: PostgresConfig,
}

/// SQLite-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Database file path.
    pub path: String,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: "data/shipyard.db".to_string(),
        }
    }
}

/// PostgreSQL-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PostgresConfig {
    /// PostgreSQL connection URI.
    pub uri: String,
    /// Maximum pool size.
    pub max_connections: u32,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            uri: "postgres://localhost:5432/orders".to_string(),
            max_connections: 10,
        }
    }
}

// ============================================================================
// Factory
// ============================================================================

/// Both storage capabilities, backed by the same store.
#[derive(Clone)]
pub struct Storage {
    pub orders: Arc<dyn OrderRepository>,
    pub outbox: Arc<dyn OutboxStore>,
}

impl Storage {
    /// Share one store for both capabilities.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: OrderRepository + OutboxStore + 'static,
    {
        Self {
            orders: store.clone(),
            outbox: store,
        }
    }
}

/// Initialize storage based on configuration.
pub async fn init_storage(
    config: &StorageConfig,
) -> std::result::Result<Storage, Box<dyn std::error::Error + Send + Sync>> {
    match config.storage_type {
        StorageType::Memory => {
            info!(storage_type = "memory", "Storage initialized");
            Ok(Storage::from_store(Arc::new(InMemoryOrderStore::new())))
        }
        StorageType::Sqlite => {
            #[cfg(feature = "sqlite")]
            {
                let store = sql::sqlite::connect(&config.sqlite).await?;
                info!(storage_type = "sqlite", path = %config.sqlite.path, "Storage initialized");
                Ok(Storage::from_store(Arc::new(store)))
            }

            #[cfg(not(feature = "sqlite"))]
            {
                tracing::error!("SQLite storage requested but 'sqlite' feature is not enabled");
                Err("SQLite support requires the 'sqlite' feature".into())
            }
        }
        StorageType::Postgres => {
            #[cfg(feature = "postgres")]
            {
                let store = sql::postgres::connect(&config.postgres).await?;
                info!(storage_type = "postgres", "Storage initialized");
                Ok(Storage::from_store(Arc::new(store)))
            }

            #[cfg(not(feature = "postgres"))]
            {
                tracing::error!("PostgreSQL storage requested but 'postgres' feature is not enabled");
                Err("PostgreSQL support requires the 'postgres' feature".into())
            }
        }
    }
}
