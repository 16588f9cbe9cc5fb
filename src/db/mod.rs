//! Database module for SQLite persistence
//!
//! Stores the document/page/content hierarchy produced by ingestion.

mod schema;
mod writer;

pub use schema::initialize_schema;
pub use writer::{DocumentStore, NewDocument, SqliteStore, SqliteWriter, StoreWriter};

#[cfg(test)]
pub(crate) use writer::{FailurePoint, FaultyStore};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use thiserror::Error;

/// Store error type
#[derive(Debug, Error)]
pub enum StoreError {
    /// Could not reach the database or open a transaction
    #[error("Database connectivity error: {0}")]
    Connectivity(String),

    /// A statement or the commit failed
    #[error("Database persistence error: {0}")]
    Persistence(String),
}

/// Result type alias for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Create a new database connection pool
pub async fn create_pool(database_url: &str) -> StoreResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| StoreError::Connectivity(format!("invalid database url: {}", e)))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .map_err(|e| StoreError::Connectivity(e.to_string()))?;

    // Run migrations
    initialize_schema(&pool).await?;

    Ok(pool)
}

/// Single-connection in-memory pool with the schema applied
#[cfg(test)]
pub(crate) async fn memory_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .unwrap();

    initialize_schema(&pool).await.unwrap();
    pool
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_create_pool_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ingest.db");
        let url = format!("sqlite://{}", path.display());

        let pool = create_pool(&url).await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM scanned_document")
            .fetch_one(&pool)
            .await
            .unwrap();

        assert_eq!(count, 0);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_unreachable_database_is_connectivity_error() {
        let result = create_pool("sqlite:///nonexistent/dir/ingest.db").await;
        assert!(matches!(result, Err(StoreError::Connectivity(_))));
    }
}
