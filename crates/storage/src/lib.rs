//! Storage abstraction and implementations for the bootcamp services.
//!
//! This crate provides a trait-based document store with in-memory and
//! JSON-file implementations, plus an optional SQLite backend.

#![warn(missing_docs)]

pub mod trait_;
pub mod document;
pub mod memory_storage;
pub mod json_storage;
#[cfg(feature = "sqlite")]
pub mod sqlite_storage;

pub use trait_::{
    load, load_all, save, Document, DocumentStore, FieldChange, Precondition, Result, Snapshot,
    StorageError, Versioned,
};
pub use document::Filter;
pub use memory_storage::MemoryStorage;
pub use json_storage::JsonStorage;
#[cfg(feature = "sqlite")]
pub use sqlite_storage::SqliteStorage;
