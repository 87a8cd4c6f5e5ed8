//! Document storage abstraction.
//!
//! The [`DocumentStore`] trait is the only way the index and admin layers
//! reach persisted documents, enabling pluggable backends (SQLite in the
//! app crate, [`memory::InMemoryDocumentStore`] for tests).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::Document;

/// Abstract document store.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`append`](DocumentStore::append) | Add a document under a topic |
/// | [`list_documents`](DocumentStore::list_documents) | Read every document, oldest first |
/// | [`list_topics`](DocumentStore::list_topics) | Distinct topics, sorted |
/// | [`delete_by_topic`](DocumentStore::delete_by_topic) | Remove a whole topic |
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Append a document and return it with its assigned id.
    async fn append(&self, topic: &str, title: &str, text: &str) -> Result<Document>;

    /// All documents, ordered by id.
    async fn list_documents(&self) -> Result<Vec<Document>>;

    /// Distinct topic names, sorted ascending.
    async fn list_topics(&self) -> Result<Vec<String>>;

    /// Delete every document of `topic`, returning the number removed.
    async fn delete_by_topic(&self, topic: &str) -> Result<u64>;
}
