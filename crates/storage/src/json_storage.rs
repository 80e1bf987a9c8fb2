//! JSON file storage implementation.
//!
//! Stores each document as a pretty-printed JSON file under
//! `<root>/<collection>/<id>.json` and keeps a small per-document meta
//! marker (version + updated_at) under `<root>/meta/<collection>/`.
//! Inside one process a read-write lock serializes writers and keeps readers
//! from seeing a document paired with another write's version, which is what
//! gives conditional writes their atomicity. Several processes sharing one
//! directory get no such guarantee.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::debug;

use crate::document::{apply_changes, Filter};
use crate::memory_storage::check_precondition;
use crate::trait_::{Document, DocumentStore, FieldChange, Precondition, Result, Snapshot, StorageError};

/// File-based JSON storage backend.
pub struct JsonStorage {
    root: PathBuf,
    lock: RwLock<()>,
}

impl JsonStorage {
    /// Create storage rooted at `root`, creating the directory if needed.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("meta")).await?;

        Ok(Self {
            root,
            lock: RwLock::new(()),
        })
    }

    /// Directory the store lives in.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn doc_path(&self, collection: &str, id: &str) -> Result<PathBuf> {
        check_key(collection)?;
        check_key(id)?;
        Ok(self.root.join(collection).join(format!("{}.json", id)))
    }

    fn meta_path(&self, collection: &str, id: &str) -> PathBuf {
        self.root
            .join("meta")
            .join(collection)
            .join(format!("{}.meta.json", id))
    }

    async fn read_version(&self, collection: &str, id: &str) -> Result<u64> {
        match fs::read_to_string(self.meta_path(collection, id)).await {
            Ok(s) => {
                let json: serde_json::Value = serde_json::from_str(&s)?;
                Ok(json.get("version").and_then(|v| v.as_u64()).unwrap_or(0))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    /// Read a document with its version. Caller holds the lock.
    async fn read_snapshot(&self, collection: &str, id: &str) -> Result<Option<Snapshot>> {
        let Some(data) = read_json(&self.doc_path(collection, id)?).await? else {
            return Ok(None);
        };
        let version = self.read_version(collection, id).await?;
        Ok(Some(Snapshot {
            id: id.to_string(),
            version,
            data,
        }))
    }

    /// Write the document and bump its meta version. Caller holds the lock for writing.
    async fn write_document(&self, collection: &str, id: &str, data: &Document, version: u64) -> Result<()> {
        let path = self.doc_path(collection, id)?;
        fs::create_dir_all(self.root.join(collection)).await?;
        write_atomic(&path, serde_json::to_string_pretty(data)?.as_bytes()).await?;

        let meta_path = self.meta_path(collection, id);
        fs::create_dir_all(self.root.join("meta").join(collection)).await?;
        let meta = serde_json::json!({ "version": version, "updated_at": chrono::Utc::now() });
        write_atomic(&meta_path, serde_json::to_string_pretty(&meta)?.as_bytes()).await?;

        debug!("Wrote {}/{} at version {}", collection, id, version);
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for JsonStorage {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Snapshot>> {
        let _guard = self.lock.read().await;
        self.read_snapshot(collection, id).await
    }

    async fn put(
        &self,
        collection: &str,
        id: &str,
        data: Document,
        precondition: Precondition,
    ) -> Result<u64> {
        let _guard = self.lock.write().await;

        let exists = fs::try_exists(self.doc_path(collection, id)?).await?;
        let stored = self.read_version(collection, id).await?;
        let current = exists.then_some(stored);
        check_precondition(collection, id, current, precondition)?;

        let version = stored + 1;
        self.write_document(collection, id, &data, version).await?;
        Ok(version)
    }

    async fn modify(&self, collection: &str, id: &str, changes: &[FieldChange]) -> Result<u64> {
        let _guard = self.lock.write().await;

        let snapshot = self
            .read_snapshot(collection, id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("{}/{}", collection, id)))?;

        let mut data = snapshot.data;
        apply_changes(&mut data, changes)?;

        let version = snapshot.version + 1;
        self.write_document(collection, id, &data, version).await?;
        Ok(version)
    }

    async fn query(&self, collection: &str, filter: &Filter) -> Result<Vec<Snapshot>> {
        check_key(collection)?;
        let _guard = self.lock.read().await;
        let dir = self.root.join(collection);
        let mut rd = match fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut items = Vec::new();
        while let Some(entry) = rd.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if let Some(snapshot) = self.read_snapshot(collection, id).await? {
                if filter.matches(&snapshot.data) {
                    items.push(snapshot);
                }
            }
        }
        items.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(items)
    }
}

/// Reject keys that would escape their directory or collide with meta files.
fn check_key(key: &str) -> Result<()> {
    let bad = key.is_empty()
        || key.starts_with('.')
        || key.contains(['/', '\\', '\0'])
        || key == "meta";
    if bad {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

async fn read_json(path: &Path) -> Result<Option<Document>> {
    match fs::read_to_string(path).await {
        Ok(json) => {
            let value = serde_json::from_str(&json)?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write through a temp file and rename so readers never see half a document.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStorage::new(dir.path()).await.unwrap();

        store.set("users", "u1", doc(json!({ "name": "Ada" }))).await.unwrap();
        assert!(dir.path().join("users").join("u1.json").exists());
        assert!(dir.path().join("meta").join("users").join("u1.meta.json").exists());

        let reopened = JsonStorage::new(dir.path()).await.unwrap();
        let snap = reopened.get("users", "u1").await.unwrap().unwrap();
        assert_eq!(snap.version, 1);
        assert_eq!(snap.data["name"], "Ada");
    }

    #[tokio::test]
    async fn test_versions_and_conditions() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStorage::new(dir.path()).await.unwrap();

        store
            .put("cohorts", "k1", doc(json!({ "studentIds": [] })), Precondition::Absent)
            .await
            .unwrap();
        let dup = store
            .put("cohorts", "k1", doc(json!({})), Precondition::Absent)
            .await;
        assert!(matches!(dup, Err(StorageError::Conflict(_))));

        let v = store
            .modify("cohorts", "k1", &[FieldChange::union("studentIds", "u1")])
            .await
            .unwrap();
        assert_eq!(v, 2);

        let stale = store
            .put("cohorts", "k1", doc(json!({})), Precondition::Version(1))
            .await;
        assert!(matches!(stale, Err(StorageError::Conflict(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_reads_never_pair_data_with_another_version() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(JsonStorage::new(dir.path()).await.unwrap());
        store.set("users", "u1", doc(json!({ "n": 0 }))).await.unwrap();

        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                for n in 1..=40 {
                    store
                        .modify("users", "u1", &[FieldChange::set("n", n)])
                        .await
                        .unwrap();
                }
            })
        };

        let mut seen = 0;
        while !writer.is_finished() || seen == 0 {
            let snap = store.get("users", "u1").await.unwrap().unwrap();
            assert_eq!(snap.data["n"], json!(snap.version - 1));
            for snap in store.query("users", &Filter::All).await.unwrap() {
                assert_eq!(snap.data["n"], json!(snap.version - 1));
            }
            seen += 1;
        }
        writer.await.unwrap();

        let last = store.get("users", "u1").await.unwrap().unwrap();
        assert_eq!(last.version, 41);
        assert_eq!(last.data["n"], 40);
    }

    #[tokio::test]
    async fn test_query_reads_collection_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStorage::new(dir.path()).await.unwrap();
        store.set("cohorts", "b", doc(json!({ "courseId": "c1" }))).await.unwrap();
        store.set("cohorts", "a", doc(json!({ "courseId": "c2" }))).await.unwrap();

        let all = store.query("cohorts", &Filter::All).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, "a");

        let c1 = store.query("cohorts", &Filter::eq("courseId", "c1")).await.unwrap();
        assert_eq!(c1.len(), 1);
        assert!(store.query("empty", &Filter::All).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_path_escapes() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStorage::new(dir.path()).await.unwrap();

        let err = store.set("users", "../evil", Document::new()).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
        assert!(store.get("meta", "x").await.is_err());
    }
}
