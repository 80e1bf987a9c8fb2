//! Document store abstraction.
//!
//! Records are JSON objects addressed by `(collection, id)`. Every write to
//! a document bumps its version, and a write is atomic for one document.
//! Nothing spans documents: callers that need cross-document consistency
//! build it from conditional writes.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::document::{self, Filter};

/// Error type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// A stored record.
pub type Document = serde_json::Map<String, Value>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Item not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// A conditional write lost against a concurrent writer
    #[error("Write conflict: {0}")]
    Conflict(String),

    /// A field path does not fit the document's shape
    #[error("Invalid field path: {0}")]
    InvalidPath(String),

    /// Collection or id cannot be used as a key
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// A document together with its version.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Document id
    pub id: String,
    /// Version of this state (starts at 1)
    pub version: u64,
    /// Document body
    pub data: Document,
}

impl Snapshot {
    /// Deserialize the document body.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(Value::Object(self.data.clone()))?)
    }
}

/// Condition a full write must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// Unconditional overwrite
    None,
    /// Only create; fail if the document exists
    Absent,
    /// Only replace the given version
    Version(u64),
}

/// One step of an in-place document update. Paths are dot-separated.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldChange {
    /// Set a field, creating intermediate objects as needed
    Set(String, Value),
    /// Remove a field
    Delete(String),
    /// Add values to an array field if not already present
    Union(String, Vec<Value>),
    /// Remove values from an array field
    Remove(String, Vec<Value>),
}

impl FieldChange {
    /// Set `path` to `value`.
    pub fn set(path: impl Into<String>, value: impl Into<Value>) -> Self {
        FieldChange::Set(path.into(), value.into())
    }

    /// Remove `path`.
    pub fn delete(path: impl Into<String>) -> Self {
        FieldChange::Delete(path.into())
    }

    /// Add `value` to the array at `path`.
    pub fn union(path: impl Into<String>, value: impl Into<Value>) -> Self {
        FieldChange::Union(path.into(), vec![value.into()])
    }

    /// Remove `value` from the array at `path`.
    pub fn remove(path: impl Into<String>, value: impl Into<Value>) -> Self {
        FieldChange::Remove(path.into(), vec![value.into()])
    }
}

/// Keyed document storage.
///
/// This trait allows different storage backends to be plugged in.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Load a document.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Snapshot>>;

    /// Replace a document wholesale. Returns the new version.
    async fn put(
        &self,
        collection: &str,
        id: &str,
        data: Document,
        precondition: Precondition,
    ) -> Result<u64>;

    /// Apply field changes to an existing document atomically.
    /// Returns the new version.
    async fn modify(&self, collection: &str, id: &str, changes: &[FieldChange]) -> Result<u64>;

    /// List the documents of a collection matching `filter`, ordered by id.
    async fn query(&self, collection: &str, filter: &Filter) -> Result<Vec<Snapshot>>;

    /// Full overwrite.
    async fn set(&self, collection: &str, id: &str, data: Document) -> Result<()> {
        self.put(collection, id, data, Precondition::None).await?;
        Ok(())
    }

    /// Merge top-level (or dotted) fields into an existing document.
    async fn update(&self, collection: &str, id: &str, fields: Document) -> Result<()> {
        let changes: Vec<FieldChange> = fields
            .into_iter()
            .map(|(path, value)| FieldChange::Set(path, value))
            .collect();
        self.modify(collection, id, &changes).await?;
        Ok(())
    }

    /// Add `value` to the array `field` if absent.
    async fn union(&self, collection: &str, id: &str, field: &str, value: Value) -> Result<()> {
        self.modify(collection, id, &[FieldChange::Union(field.to_string(), vec![value])])
            .await?;
        Ok(())
    }
}

/// A typed document with the version it was read at.
#[derive(Debug, Clone)]
pub struct Versioned<T> {
    /// Decoded document
    pub value: T,
    /// Version it was read at
    pub version: u64,
}

/// Load and decode a document.
pub async fn load<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &str,
    id: &str,
) -> Result<Option<Versioned<T>>> {
    match store.get(collection, id).await? {
        Some(snapshot) => Ok(Some(Versioned {
            value: snapshot.decode()?,
            version: snapshot.version,
        })),
        None => Ok(None),
    }
}

/// Load and decode every document of a collection matching `filter`.
pub async fn load_all<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &str,
    filter: &Filter,
) -> Result<Vec<T>> {
    store
        .query(collection, filter)
        .await?
        .iter()
        .map(Snapshot::decode)
        .collect()
}

/// Encode and write a document.
pub async fn save<T: Serialize + Sync + ?Sized>(
    store: &dyn DocumentStore,
    collection: &str,
    id: &str,
    value: &T,
    precondition: Precondition,
) -> Result<u64> {
    let data = document::to_document(value)?;
    store.put(collection, id, data, precondition).await
}
