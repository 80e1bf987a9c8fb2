//! SQLite storage backend.
//!
//! Keeps every document as a JSON text column in one `documents` table.
//! Conditional writes are pushed down into SQL so several processes may
//! share one database file.

use async_trait::async_trait;
use sqlx::Row;
use std::path::Path;
use tracing::{debug, warn};

use crate::document::{apply_changes, Filter};
use crate::trait_::{Document, DocumentStore, FieldChange, Precondition, Result, Snapshot, StorageError};

/// How often `modify` re-reads after losing a version race.
const MODIFY_ATTEMPTS: usize = 8;

/// SQLite storage implementation.
#[derive(Clone)]
pub struct SqliteStorage {
    /// Database connection pool
    pool: sqlx::SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance.
    pub async fn new(db_url: &str) -> Result<Self> {
        let pool = sqlx::SqlitePool::connect(db_url)
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;

        let storage = Self { pool };
        storage.init_schema().await?;

        Ok(storage)
    }

    /// Open (creating if needed) a database file.
    pub async fn new_from_path(path: &Path) -> Result<Self> {
        let url = format!("sqlite://{}?mode=rwc", path.display());
        Self::new(&url).await
    }

    /// Create an in-memory database.
    ///
    /// Each SQLite connection owns a separate memory database, so the pool
    /// is pinned to one connection.
    pub async fn in_memory() -> Result<Self> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;

        let storage = Self { pool };
        storage.init_schema().await?;

        Ok(storage)
    }

    /// Initialize the database schema.
    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                data TEXT NOT NULL,
                version INTEGER NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (collection, id)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Other(e.to_string()))?;

        Ok(())
    }

    /// Check the database connection.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    /// Replace `id` only if it is still at `expected`. Returns false on a lost race.
    async fn compare_and_swap(
        &self,
        collection: &str,
        id: &str,
        data: &Document,
        expected: u64,
    ) -> Result<bool> {
        let json = serde_json::to_string(data)?;
        let result = sqlx::query(
            "UPDATE documents SET data = ?, version = version + 1, updated_at = ?
             WHERE collection = ? AND id = ? AND version = ?",
        )
        .bind(json)
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(collection)
        .bind(id)
        .bind(expected as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Other(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl DocumentStore for SqliteStorage {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Snapshot>> {
        let row = sqlx::query("SELECT data, version FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;

        match row {
            Some(row) => Ok(Some(snapshot_from_row(id.to_string(), &row)?)),
            None => Ok(None),
        }
    }

    async fn put(
        &self,
        collection: &str,
        id: &str,
        data: Document,
        precondition: Precondition,
    ) -> Result<u64> {
        let conflict = || StorageError::Conflict(format!("{}/{} ({:?})", collection, id, precondition));
        let now = chrono::Utc::now().to_rfc3339();

        match precondition {
            Precondition::Version(expected) => {
                if self.compare_and_swap(collection, id, &data, expected).await? {
                    Ok(expected + 1)
                } else {
                    Err(conflict())
                }
            }
            Precondition::Absent => {
                let result = sqlx::query(
                    "INSERT INTO documents (collection, id, data, version, updated_at)
                     VALUES (?, ?, ?, 1, ?)
                     ON CONFLICT (collection, id) DO NOTHING",
                )
                .bind(collection)
                .bind(id)
                .bind(serde_json::to_string(&data)?)
                .bind(now)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Other(e.to_string()))?;

                if result.rows_affected() == 1 {
                    Ok(1)
                } else {
                    Err(conflict())
                }
            }
            Precondition::None => {
                let row = sqlx::query(
                    "INSERT INTO documents (collection, id, data, version, updated_at)
                     VALUES (?, ?, ?, 1, ?)
                     ON CONFLICT (collection, id) DO UPDATE SET
                        data = excluded.data,
                        version = documents.version + 1,
                        updated_at = excluded.updated_at
                     RETURNING version",
                )
                .bind(collection)
                .bind(id)
                .bind(serde_json::to_string(&data)?)
                .bind(now)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| StorageError::Other(e.to_string()))?;

                let version: i64 = row
                    .try_get("version")
                    .map_err(|e| StorageError::Other(e.to_string()))?;
                Ok(version as u64)
            }
        }
    }

    async fn modify(&self, collection: &str, id: &str, changes: &[FieldChange]) -> Result<u64> {
        for attempt in 1..=MODIFY_ATTEMPTS {
            let snapshot = self
                .get(collection, id)
                .await?
                .ok_or_else(|| StorageError::NotFound(format!("{}/{}", collection, id)))?;

            let mut data = snapshot.data;
            apply_changes(&mut data, changes)?;

            if self.compare_and_swap(collection, id, &data, snapshot.version).await? {
                return Ok(snapshot.version + 1);
            }
            debug!("Lost version race on {}/{} (attempt {})", collection, id, attempt);
        }

        warn!("Giving up modify of {}/{} after {} attempts", collection, id, MODIFY_ATTEMPTS);
        Err(StorageError::Conflict(format!("{}/{}", collection, id)))
    }

    async fn query(&self, collection: &str, filter: &Filter) -> Result<Vec<Snapshot>> {
        let rows = sqlx::query("SELECT id, data, version FROM documents WHERE collection = ? ORDER BY id")
            .bind(collection)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;

        let mut items = Vec::new();
        for row in rows {
            let id: String = row
                .try_get("id")
                .map_err(|e| StorageError::Other(e.to_string()))?;
            let snapshot = snapshot_from_row(id, &row)?;
            if filter.matches(&snapshot.data) {
                items.push(snapshot);
            }
        }
        Ok(items)
    }
}

fn snapshot_from_row(id: String, row: &sqlx::sqlite::SqliteRow) -> Result<Snapshot> {
    let data: String = row
        .try_get("data")
        .map_err(|e| StorageError::Other(e.to_string()))?;
    let version: i64 = row
        .try_get("version")
        .map_err(|e| StorageError::Other(e.to_string()))?;

    Ok(Snapshot {
        id,
        version: version as u64,
        data: serde_json::from_str(&data)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_in_memory_storage() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        assert!(storage.health_check().await);

        storage.set("users", "u1", doc(json!({ "name": "Ada" }))).await.unwrap();
        storage.set("users", "u1", doc(json!({ "name": "Grace" }))).await.unwrap();

        let snap = storage.get("users", "u1").await.unwrap().unwrap();
        assert_eq!(snap.version, 2);
        assert_eq!(snap.data["name"], "Grace");
    }

    #[tokio::test]
    async fn test_conditional_writes() {
        let storage = SqliteStorage::in_memory().await.unwrap();

        storage
            .put("cohorts", "k1", doc(json!({ "studentIds": [] })), Precondition::Absent)
            .await
            .unwrap();
        let dup = storage
            .put("cohorts", "k1", doc(json!({})), Precondition::Absent)
            .await;
        assert!(matches!(dup, Err(StorageError::Conflict(_))));

        let v = storage
            .modify("cohorts", "k1", &[FieldChange::union("studentIds", "u1")])
            .await
            .unwrap();
        assert_eq!(v, 2);

        let stale = storage
            .put("cohorts", "k1", doc(json!({})), Precondition::Version(1))
            .await;
        assert!(matches!(stale, Err(StorageError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_query() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        storage.set("cohorts", "b", doc(json!({ "courseId": "c1" }))).await.unwrap();
        storage.set("cohorts", "a", doc(json!({ "courseId": "c1" }))).await.unwrap();
        storage.set("users", "a", doc(json!({ "courseId": "c1" }))).await.unwrap();

        let found = storage.query("cohorts", &Filter::eq("courseId", "c1")).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, "a");
    }
}
