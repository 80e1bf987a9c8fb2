//! In-process storage backend.
//!
//! Keeps every collection in a map behind one lock. Used by tests and by
//! embedders that bring their own persistence.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use crate::document::{apply_changes, Filter};
use crate::trait_::{Document, DocumentStore, FieldChange, Precondition, Result, Snapshot, StorageError};

#[derive(Debug, Clone)]
struct Entry {
    version: u64,
    data: Document,
}

/// Memory-backed document store.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    collections: RwLock<HashMap<String, BTreeMap<String, Entry>>>,
}

impl MemoryStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in a collection.
    pub async fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|c| c.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl DocumentStore for MemoryStorage {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Snapshot>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|c| c.get(id))
            .map(|entry| Snapshot {
                id: id.to_string(),
                version: entry.version,
                data: entry.data.clone(),
            }))
    }

    async fn put(
        &self,
        collection: &str,
        id: &str,
        data: Document,
        precondition: Precondition,
    ) -> Result<u64> {
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();
        let current = docs.get(id).map(|e| e.version);

        check_precondition(collection, id, current, precondition)?;

        let version = current.unwrap_or(0) + 1;
        docs.insert(id.to_string(), Entry { version, data });
        Ok(version)
    }

    async fn modify(&self, collection: &str, id: &str, changes: &[FieldChange]) -> Result<u64> {
        let mut collections = self.collections.write().await;
        let entry = collections
            .get_mut(collection)
            .and_then(|c| c.get_mut(id))
            .ok_or_else(|| StorageError::NotFound(format!("{}/{}", collection, id)))?;

        let mut data = entry.data.clone();
        apply_changes(&mut data, changes)?;
        entry.data = data;
        entry.version += 1;
        Ok(entry.version)
    }

    async fn query(&self, collection: &str, filter: &Filter) -> Result<Vec<Snapshot>> {
        let collections = self.collections.read().await;
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(docs
            .iter()
            .filter(|(_, entry)| filter.matches(&entry.data))
            .map(|(id, entry)| Snapshot {
                id: id.clone(),
                version: entry.version,
                data: entry.data.clone(),
            })
            .collect())
    }
}

/// Shared precondition check. `current` is the version on disk, if any.
pub(crate) fn check_precondition(
    collection: &str,
    id: &str,
    current: Option<u64>,
    precondition: Precondition,
) -> Result<()> {
    let ok = match precondition {
        Precondition::None => true,
        Precondition::Absent => current.is_none(),
        Precondition::Version(expected) => current == Some(expected),
    };
    if ok {
        Ok(())
    } else {
        Err(StorageError::Conflict(format!(
            "{}/{} (expected {:?}, found {:?})",
            collection, id, precondition, current
        )))
    }
}
