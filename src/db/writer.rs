//! Transactional writer for scanned documents

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use super::{StoreError, StoreResult};
use crate::pages::RegionResult;

/// Document row to insert
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub filename: String,
    pub filetype: String,
    pub current_path: String,
    pub original_path: String,
}

/// Opens one write unit per ingested file
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Acquire a connection and open a transaction
    async fn begin(&self) -> StoreResult<Box<dyn StoreWriter>>;
}

/// One open transaction.
///
/// `commit` and `rollback` consume the writer; dropping it uncommitted rolls
/// back and releases the connection.
#[async_trait]
pub trait StoreWriter: Send {
    async fn insert_document(&mut self, document: &NewDocument) -> StoreResult<Uuid>;

    async fn insert_page(
        &mut self,
        document_id: Uuid,
        page_number: u32,
        width: u32,
        height: u32,
    ) -> StoreResult<Uuid>;

    async fn insert_content(&mut self, page_id: Uuid, region: &RegionResult) -> StoreResult<Uuid>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

/// SQLite-backed store
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreWriter>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Connectivity(e.to_string()))?;

        Ok(Box::new(SqliteWriter { tx }))
    }
}

pub struct SqliteWriter {
    tx: Transaction<'static, Sqlite>,
}

fn persistence(err: sqlx::Error) -> StoreError {
    StoreError::Persistence(err.to_string())
}

#[async_trait]
impl StoreWriter for SqliteWriter {
    async fn insert_document(&mut self, document: &NewDocument) -> StoreResult<Uuid> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO scanned_document (id, filename, filetype, current_path, original_path, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&document.filename)
        .bind(&document.filetype)
        .bind(&document.current_path)
        .bind(&document.original_path)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *self.tx)
        .await
        .map_err(persistence)?;

        Ok(id)
    }

    async fn insert_page(
        &mut self,
        document_id: Uuid,
        page_number: u32,
        width: u32,
        height: u32,
    ) -> StoreResult<Uuid> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO scanned_page (id, document_id, page_number, width, height)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(document_id.to_string())
        .bind(i64::from(page_number))
        .bind(i64::from(width))
        .bind(i64::from(height))
        .execute(&mut *self.tx)
        .await
        .map_err(persistence)?;

        Ok(id)
    }

    async fn insert_content(&mut self, page_id: Uuid, region: &RegionResult) -> StoreResult<Uuid> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO scanned_page_content (id, page_id, content, x_pct, y_pct, w_pct, h_pct, density)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(page_id.to_string())
        .bind(&region.text)
        .bind(region.bbox.x_pct)
        .bind(region.bbox.y_pct)
        .bind(region.bbox.w_pct)
        .bind(region.bbox.h_pct)
        .bind(region.density)
        .execute(&mut *self.tx)
        .await
        .map_err(persistence)?;

        Ok(id)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await.map_err(persistence)
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx.rollback().await.map_err(persistence)
    }
}

/// Where a [`FaultyStore`] injects its failure
#[cfg(test)]
#[derive(Debug, Clone, Copy)]
pub(crate) enum FailurePoint {
    Begin,
    /// The nth content insert (1-based) fails
    Content(usize),
    Commit,
}

/// Store over a real SQLite pool that fails at a chosen point, for testing
#[cfg(test)]
pub(crate) struct FaultyStore {
    inner: SqliteStore,
    failure: FailurePoint,
}

#[cfg(test)]
impl FaultyStore {
    pub fn new(pool: SqlitePool, failure: FailurePoint) -> Self {
        Self {
            inner: SqliteStore::new(pool),
            failure,
        }
    }
}

#[cfg(test)]
#[async_trait]
impl DocumentStore for FaultyStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreWriter>> {
        if let FailurePoint::Begin = self.failure {
            return Err(StoreError::Connectivity("connection refused".to_string()));
        }

        Ok(Box::new(FaultyWriter {
            inner: self.inner.begin().await?,
            failure: self.failure,
            contents: 0,
        }))
    }
}

#[cfg(test)]
struct FaultyWriter {
    inner: Box<dyn StoreWriter>,
    failure: FailurePoint,
    contents: usize,
}

#[cfg(test)]
#[async_trait]
impl StoreWriter for FaultyWriter {
    async fn insert_document(&mut self, document: &NewDocument) -> StoreResult<Uuid> {
        self.inner.insert_document(document).await
    }

    async fn insert_page(
        &mut self,
        document_id: Uuid,
        page_number: u32,
        width: u32,
        height: u32,
    ) -> StoreResult<Uuid> {
        self.inner
            .insert_page(document_id, page_number, width, height)
            .await
    }

    async fn insert_content(&mut self, page_id: Uuid, region: &RegionResult) -> StoreResult<Uuid> {
        self.contents += 1;
        if let FailurePoint::Content(n) = self.failure {
            if n == self.contents {
                return Err(StoreError::Persistence("disk I/O error".to_string()));
            }
        }
        self.inner.insert_content(page_id, region).await
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        if let FailurePoint::Commit = self.failure {
            self.inner.rollback().await?;
            return Err(StoreError::Persistence("commit failed".to_string()));
        }
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.inner.rollback().await
    }
}
