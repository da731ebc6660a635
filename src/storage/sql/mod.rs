//! Unified SQL storage implementations.
//!
//! Shared implementation for the SQL backends (PostgreSQL, SQLite),
//! parameterized by database type through the `SqlDatabase` trait.

mod order_store;
mod query;
pub mod schema;

pub use order_store::SqlOrderStore;
pub use query::SqlDatabase;

#[cfg(feature = "postgres")]
pub mod postgres {
    //! PostgreSQL database backend.

    use sea_query::PostgresQueryBuilder;
    use sqlx::postgres::PgPoolOptions;
    use sqlx::PgPool;

    use crate::storage::{PostgresConfig, Result};

    /// PostgreSQL database marker type.
    pub struct Postgres;

    impl super::SqlDatabase for Postgres {
        type Pool = PgPool;

        const CREATE_TABLES: &'static str = super::schema::POSTGRES_CREATE_TABLES;

        fn builder() -> impl sea_query::QueryBuilder {
            PostgresQueryBuilder
        }
    }

    /// PostgreSQL order store.
    pub type PostgresOrderStore = super::SqlOrderStore<Postgres>;

    /// Connect and create the schema.
    pub async fn connect(config: &PostgresConfig) -> Result<PostgresOrderStore> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.uri)
            .await?;
        let store = PostgresOrderStore::new(pool);
        store.init().await?;
        Ok(store)
    }
}

#[cfg(feature = "sqlite")]
pub mod sqlite {
    //! SQLite database backend.

    use sea_query::SqliteQueryBuilder;
    use sqlx::SqlitePool;

    use crate::storage::{Result, SqliteConfig, StorageError};

    /// SQLite database marker type.
    pub struct Sqlite;

    impl super::SqlDatabase for Sqlite {
        type Pool = SqlitePool;

        const CREATE_TABLES: &'static str = super::schema::SQLITE_CREATE_TABLES;

        fn builder() -> impl sea_query::QueryBuilder {
            SqliteQueryBuilder
        }
    }

    /// SQLite order store.
    pub type SqliteOrderStore = super::SqlOrderStore<Sqlite>;

    /// Open (creating if needed) the database file and create the schema.
    pub async fn connect(config: &SqliteConfig) -> Result<SqliteOrderStore> {
        if let Some(parent) = std::path::Path::new(&config.path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StorageError::Unavailable(e.to_string()))?;
            }
        }

        let pool = SqlitePool::connect(&format!("sqlite:{}?mode=rwc", config.path)).await?;
        let store = SqliteOrderStore::new(pool);
        store.init().await?;
        Ok(store)
    }
}
