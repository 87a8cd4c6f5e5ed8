//! Administrative document management.
//!
//! Every mutation of the document store is followed by a rebuild so the
//! change becomes visible to queries. The store write and the rebuild are
//! reported separately: a write that lands while another rebuild is running
//! is still a successful write, and the running rebuild or the next one
//! picks it up.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use encoding_rs::{WINDOWS_1251, WINDOWS_1252};
use serde::Serialize;
use tracing::{info, warn};

use ragdesk_core::models::Document;
use ragdesk_core::store::DocumentStore;

use crate::error::IndexError;
use crate::index::{IndexManager, RebuildReport};

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RebuildOutcome {
    Rebuilt(RebuildReport),
    AlreadyRunning,
    Failed { message: String },
}

impl From<Result<RebuildReport, IndexError>> for RebuildOutcome {
    fn from(result: Result<RebuildReport, IndexError>) -> Self {
        match result {
            Ok(report) => RebuildOutcome::Rebuilt(report),
            Err(IndexError::RebuildInProgress) => RebuildOutcome::AlreadyRunning,
            Err(e @ IndexError::BuildFailure(_)) => RebuildOutcome::Failed {
                message: e.to_string(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AdminReport {
    /// Documents added or removed.
    pub rows: u64,
    pub rebuild: RebuildOutcome,
}

pub struct AdminWorkflow {
    store: Arc<dyn DocumentStore>,
    index: Arc<IndexManager>,
}

impl AdminWorkflow {
    pub fn new(store: Arc<dyn DocumentStore>, index: Arc<IndexManager>) -> Self {
        Self { store, index }
    }

    pub async fn add_document(&self, topic: &str, title: &str, text: &str) -> Result<AdminReport> {
        let topic = topic.trim();
        if topic.is_empty() {
            bail!("topic must not be empty");
        }
        if text.trim().is_empty() {
            bail!("document text must not be empty");
        }
        let title = match title.trim() {
            "" => topic,
            t => t,
        };

        let document: Document = self.store.append(topic, title, text).await?;
        info!(document_id = document.id, topic, title, chars = text.len(), "document added");
        Ok(AdminReport {
            rows: 1,
            rebuild: self.rebuild_after_change().await,
        })
    }

    /// Add an uploaded file. The file stem names both the topic and the
    /// title. Content is read as UTF-8, then Windows-1251, then Latin-1.
    pub async fn add_file(&self, file_name: &str, bytes: &[u8]) -> Result<AdminReport> {
        let stem = Path::new(file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .with_context(|| format!("cannot derive a topic from file name '{}'", file_name))?;
        let text = decode_text(bytes);
        self.add_document(stem, stem, &text).await
    }

    pub async fn delete_topic(&self, topic: &str) -> Result<AdminReport> {
        let rows = self.store.delete_by_topic(topic).await?;
        info!(topic, rows, "topic deleted");
        Ok(AdminReport {
            rows,
            rebuild: self.rebuild_after_change().await,
        })
    }

    pub async fn rebuild(&self) -> Result<RebuildReport, IndexError> {
        self.index.rebuild().await
    }

    pub async fn topics(&self) -> Result<Vec<String>> {
        self.store.list_topics().await
    }

    async fn rebuild_after_change(&self) -> RebuildOutcome {
        let outcome = RebuildOutcome::from(self.index.rebuild().await);
        if let RebuildOutcome::AlreadyRunning = outcome {
            warn!("store changed while a rebuild was running; change applies on the next rebuild");
        }
        outcome
    }
}

fn decode_text(bytes: &[u8]) -> String {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return text.to_string();
    }
    if let Some(text) = WINDOWS_1251.decode_without_bom_handling_and_without_replacement(bytes) {
        return text.into_owned();
    }
    // WHATWG maps the "latin1" label to windows-1252.
    let (text, _) = WINDOWS_1252.decode_without_bom_handling(bytes);
    text.into_owned()
}
