//! In-memory [`DocumentStore`] implementation for tests and embedding.
//!
//! Uses a `Vec` behind `std::sync::RwLock`. Locks are never held across an
//! await point.

use std::collections::BTreeSet;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;

use crate::models::Document;

use super::DocumentStore;

#[derive(Default)]
struct Inner {
    next_id: i64,
    docs: Vec<Document>,
}

/// In-memory document store.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    inner: RwLock<Inner>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("document store lock poisoned")
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn append(&self, topic: &str, title: &str, text: &str) -> Result<Document> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        inner.next_id += 1;
        let doc = Document {
            id: inner.next_id,
            topic: topic.to_string(),
            title: title.to_string(),
            text: text.to_string(),
            created_at: Utc::now(),
        };
        inner.docs.push(doc.clone());
        Ok(doc)
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner.docs.clone())
    }

    async fn list_topics(&self) -> Result<Vec<String>> {
        let inner = self.inner.read().map_err(poisoned)?;
        let topics: BTreeSet<String> = inner.docs.iter().map(|d| d.topic.clone()).collect();
        Ok(topics.into_iter().collect())
    }

    async fn delete_by_topic(&self, topic: &str) -> Result<u64> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        let before = inner.docs.len();
        inner.docs.retain(|d| d.topic != topic);
        Ok((before - inner.docs.len()) as u64)
    }
}
