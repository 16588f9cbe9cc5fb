//! Database schema initialization

use sqlx::SqlitePool;

use super::{StoreError, StoreResult};

/// Initialize the database schema
pub async fn initialize_schema(pool: &SqlitePool) -> StoreResult<()> {
    sqlx::query(SCHEMA_SQL)
        .execute(pool)
        .await
        .map_err(|e| StoreError::Connectivity(format!("schema bootstrap failed: {}", e)))?;

    Ok(())
}

const SCHEMA_SQL: &str = r#"
-- One row per ingested file
CREATE TABLE IF NOT EXISTS scanned_document (
    id TEXT PRIMARY KEY,
    filename TEXT NOT NULL,
    filetype TEXT NOT NULL,
    current_path TEXT NOT NULL,
    original_path TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per page, in document order
CREATE TABLE IF NOT EXISTS scanned_page (
    id TEXT PRIMARY KEY,
    document_id TEXT NOT NULL REFERENCES scanned_document(id),
    page_number INTEGER NOT NULL CHECK (page_number >= 1),
    width INTEGER NOT NULL CHECK (width >= 0),
    height INTEGER NOT NULL CHECK (height >= 0),

    UNIQUE(document_id, page_number)
);

CREATE INDEX IF NOT EXISTS idx_scanned_page_document_id ON scanned_page(document_id);

-- One row per recognized region
CREATE TABLE IF NOT EXISTS scanned_page_content (
    id TEXT PRIMARY KEY,
    page_id TEXT NOT NULL REFERENCES scanned_page(id),
    content TEXT NOT NULL,
    x_pct REAL NOT NULL CHECK (x_pct BETWEEN 0 AND 100),
    y_pct REAL NOT NULL CHECK (y_pct BETWEEN 0 AND 100),
    w_pct REAL NOT NULL CHECK (w_pct BETWEEN 0 AND 100),
    h_pct REAL NOT NULL CHECK (h_pct BETWEEN 0 AND 100),
    density REAL NOT NULL CHECK (density BETWEEN 0 AND 1)
);

CREATE INDEX IF NOT EXISTS idx_scanned_page_content_page_id ON scanned_page_content(page_id);
"#;
