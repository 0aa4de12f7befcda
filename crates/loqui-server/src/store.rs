//! `SQLite` implementation of the `MemoryStore` port.
//!
//! One row per hardware id. All writes funnel through the single memory
//! writer task, which serialises them per installation; this adapter only
//! has to be correct, not clever.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use loqui_core::domain::memory::{MemoryRecord, MemorySnapshot};
use loqui_core::ports::{MemoryStore, MemoryStoreError};

/// `SQLite`-backed memory repository.
pub struct SqliteMemoryStore {
    pool: SqlitePool,
}

impl SqliteMemoryStore {
    /// Wrap an existing pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if missing) the database at `path` and ensure the
    /// schema.
    pub async fn open(path: &std::path::Path) -> Result<Self, MemoryStoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| MemoryStoreError::Storage(e.to_string()))?;

        let store = Self::new(pool);
        store.ensure_table().await?;
        Ok(store)
    }

    /// In-memory database for tests.
    pub async fn open_in_memory() -> Result<Self, MemoryStoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| MemoryStoreError::Storage(e.to_string()))?;
        let store = Self::new(pool);
        store.ensure_table().await?;
        Ok(store)
    }

    /// Create the schema if it does not exist.
    pub async fn ensure_table(&self) -> Result<(), MemoryStoreError> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS memory_records (
                hardware_id TEXT PRIMARY KEY NOT NULL,
                short_term  TEXT NOT NULL DEFAULT '',
                long_term   TEXT NOT NULL DEFAULT '',
                updated_at  TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryStoreError::Storage(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl MemoryStore for SqliteMemoryStore {
    async fn fetch(&self, hardware_id: &str) -> Result<Option<MemoryRecord>, MemoryStoreError> {
        let row = sqlx::query(
            "SELECT hardware_id, short_term, long_term, updated_at \
             FROM memory_records WHERE hardware_id = ?",
        )
        .bind(hardware_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| MemoryStoreError::Storage(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let updated_at: chrono::DateTime<chrono::Utc> = row
            .try_get::<String, _>("updated_at")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_else(chrono::Utc::now);

        Ok(Some(MemoryRecord {
            hardware_id: row
                .try_get("hardware_id")
                .map_err(|e| MemoryStoreError::Storage(e.to_string()))?,
            snapshot: MemorySnapshot {
                short_term: row
                    .try_get("short_term")
                    .map_err(|e| MemoryStoreError::Storage(e.to_string()))?,
                long_term: row
                    .try_get("long_term")
                    .map_err(|e| MemoryStoreError::Storage(e.to_string()))?,
            },
            updated_at,
        }))
    }

    async fn store(&self, record: &MemoryRecord) -> Result<(), MemoryStoreError> {
        sqlx::query(
            "INSERT INTO memory_records (hardware_id, short_term, long_term, updated_at) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT(hardware_id) DO UPDATE SET \
                 short_term = excluded.short_term, \
                 long_term = excluded.long_term, \
                 updated_at = excluded.updated_at",
        )
        .bind(&record.hardware_id)
        .bind(&record.snapshot.short_term)
        .bind(&record.snapshot.long_term)
        .bind(record.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryStoreError::Storage(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fetch_missing_is_none() {
        let store = SqliteMemoryStore::open_in_memory().await.unwrap();
        assert!(store.fetch("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn store_then_fetch_round_trips() {
        let store = SqliteMemoryStore::open_in_memory().await.unwrap();

        let record = MemoryRecord::now(
            "hw-42",
            MemorySnapshot {
                short_term: "asked about the weather".into(),
                long_term: "prefers brief answers".into(),
            },
        );
        store.store(&record).await.unwrap();

        let fetched = store.fetch("hw-42").await.unwrap().unwrap();
        assert_eq!(fetched.hardware_id, "hw-42");
        assert_eq!(fetched.snapshot, record.snapshot);
    }

    #[tokio::test]
    async fn store_overwrites_existing_record() {
        let store = SqliteMemoryStore::open_in_memory().await.unwrap();

        store
            .store(&MemoryRecord::now(
                "hw-1",
                MemorySnapshot {
                    short_term: "old".into(),
                    long_term: "keep".into(),
                },
            ))
            .await
            .unwrap();
        store
            .store(&MemoryRecord::now(
                "hw-1",
                MemorySnapshot {
                    short_term: "new".into(),
                    long_term: "keep".into(),
                },
            ))
            .await
            .unwrap();

        let fetched = store.fetch("hw-1").await.unwrap().unwrap();
        assert_eq!(fetched.snapshot.short_term, "new");
    }

    #[tokio::test]
    async fn open_creates_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.db");
        let store = SqliteMemoryStore::open(&path).await.unwrap();
        store
            .store(&MemoryRecord::now("hw", MemorySnapshot::default()))
            .await
            .unwrap();
        assert!(path.exists());
    }
}
