//! Index lifecycle: building snapshots and publishing them atomically.
//!
//! [`IndexBuilder`] turns documents into a fresh [`Snapshot`]. It never
//! touches the active snapshot.
//!
//! [`IndexManager`] owns the active snapshot pointer. Readers clone the
//! `Arc` under a brief read lock and then query lock-free, so a query runs
//! against exactly one snapshot even if a rebuild publishes mid-call. A
//! rebuild builds out-of-place and swaps the pointer under a brief write
//! lock; the old snapshot is freed when its last in-flight reader drops it.
//!
//! ```text
//!   rebuild()                                query()
//!      │ try_acquire(slot) ── busy ──▶ RebuildInProgress
//!      ▼                                       │
//!   store.list_documents()                     ▼
//!      ▼                              active.read() ─▶ Arc<Snapshot>
//!   IndexBuilder::build()                      │ (lock released)
//!      ▼                                       ▼
//!   persist (optional)                 snapshot.nearest(topic, v, k)
//!      ▼
//!   active.write() = new Arc   ◀── single pointer swap
//! ```
//!
//! Rebuilds are serialized by a single-permit semaphore that is only ever
//! `try_acquire`d: a second concurrent rebuild fails fast instead of queuing.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context};
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use ragdesk_core::chunk::chunk_text;
use ragdesk_core::embedding::Embedder;
use ragdesk_core::models::{Document, ScoredChunk};
use ragdesk_core::snapshot::{IndexedChunk, Snapshot};
use ragdesk_core::store::DocumentStore;

use crate::config::Config;
use crate::error::IndexError;
use crate::upstream;

const SNAPSHOT_FILE: &str = "snapshot.json";
const SNAPSHOT_TMP_FILE: &str = "snapshot.json.tmp";

/// Chunks and embeds documents into a new snapshot.
pub struct IndexBuilder {
    embedder: Arc<dyn Embedder>,
    max_chars: usize,
    overlap_chars: usize,
    batch_size: usize,
    embed_timeout: Duration,
}

impl IndexBuilder {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        max_chars: usize,
        overlap_chars: usize,
        batch_size: usize,
        embed_timeout: Duration,
    ) -> Self {
        Self {
            embedder,
            max_chars,
            overlap_chars,
            batch_size: batch_size.max(1),
            embed_timeout,
        }
    }

    pub fn from_config(embedder: Arc<dyn Embedder>, config: &Config) -> Self {
        Self::new(
            embedder,
            config.chunking.max_chars,
            config.chunking.overlap_chars,
            config.index.batch_size,
            upstream::call_budget(config.embedding.timeout_secs, config.embedding.max_retries),
        )
    }

    pub fn model_name(&self) -> &str {
        self.embedder.model_name()
    }

    /// Build a snapshot of `documents` tagged with `generation`.
    ///
    /// All or nothing: any embedding failure, timeout, or malformed
    /// response fails the whole build.
    pub async fn build(&self, documents: &[Document], generation: u64) -> anyhow::Result<Snapshot> {
        let chunks: Vec<_> = documents
            .iter()
            .flat_map(|doc| chunk_text(doc, self.max_chars, self.overlap_chars))
            .collect();

        let mut entries: Vec<IndexedChunk> = Vec::with_capacity(chunks.len());
        let mut dims: Option<usize> = None;

        for (batch_no, batch) in chunks.chunks(self.batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = tokio::time::timeout(self.embed_timeout, self.embedder.embed(&texts))
                .await
                .map_err(|_| {
                    anyhow!(
                        "embedding batch {} timed out after {}s",
                        batch_no,
                        self.embed_timeout.as_secs()
                    )
                })?
                .with_context(|| format!("embedding batch {} failed", batch_no))?;

            if vectors.len() != batch.len() {
                bail!(
                    "embedding batch {} returned {} vectors for {} chunks",
                    batch_no,
                    vectors.len(),
                    batch.len()
                );
            }

            for (chunk, vector) in batch.iter().zip(vectors) {
                let expected = *dims.get_or_insert(vector.len());
                if vector.is_empty() || vector.len() != expected {
                    bail!(
                        "chunk {} has a {}-dimensional embedding, expected {}",
                        chunk.id,
                        vector.len(),
                        expected
                    );
                }
                entries.push(IndexedChunk {
                    chunk: chunk.clone(),
                    vector,
                });
            }
        }

        Ok(Snapshot::new(generation, self.embedder.model_name(), entries))
    }
}

/// Outcome of a successful rebuild.
#[derive(Debug, Clone, Serialize)]
pub struct RebuildReport {
    pub generation: u64,
    pub snapshot_id: String,
    pub documents: usize,
    pub chunks: usize,
    pub topics: usize,
    pub elapsed_ms: u128,
}

/// Point-in-time description of the active snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub generation: u64,
    pub snapshot_id: String,
    pub built_at: String,
    pub model: String,
    pub chunks: usize,
    pub topics: Vec<TopicStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopicStats {
    pub topic: String,
    pub chunks: usize,
}

/// Owns the active snapshot and serializes rebuilds.
pub struct IndexManager {
    store: Arc<dyn DocumentStore>,
    builder: IndexBuilder,
    active: RwLock<Arc<Snapshot>>,
    rebuild_slot: Semaphore,
    persist_dir: Option<PathBuf>,
}

impl IndexManager {
    /// Create a manager serving the empty generation-0 snapshot.
    pub fn new(store: Arc<dyn DocumentStore>, builder: IndexBuilder) -> Self {
        Self {
            store,
            builder,
            active: RwLock::new(Arc::new(Snapshot::empty())),
            rebuild_slot: Semaphore::new(1),
            persist_dir: None,
        }
    }

    /// Persist every published snapshot under `dir` for warm restarts.
    pub fn with_persist_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.persist_dir = dir;
        self
    }

    /// The snapshot active right now.
    ///
    /// The returned `Arc` stays valid after a later rebuild publishes a
    /// newer snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        let guard = self.active.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Top-`k` chunks of `topic` nearest to `question_vector`, against the
    /// snapshot active at call time.
    pub fn query(&self, topic: &str, question_vector: &[f32], k: usize) -> Vec<ScoredChunk> {
        self.snapshot().nearest(topic, question_vector, k)
    }

    pub fn is_rebuilding(&self) -> bool {
        self.rebuild_slot.available_permits() == 0
    }

    /// Re-read every document, build a new snapshot, and publish it.
    ///
    /// Fails immediately with [`IndexError::RebuildInProgress`] when another
    /// rebuild is running. On [`IndexError::BuildFailure`] the active
    /// snapshot is unchanged.
    pub async fn rebuild(&self) -> Result<RebuildReport, IndexError> {
        let _permit = self.rebuild_slot.try_acquire().map_err(|_| {
            warn!("rebuild rejected: another rebuild is in progress");
            IndexError::RebuildInProgress
        })?;

        let started = Instant::now();
        let generation = self.snapshot().generation() + 1;
        info!(generation, "index rebuild started");

        let result = self.build_and_persist(generation).await;
        let (snapshot, documents) = match result {
            Ok(built) => built,
            Err(e) => {
                warn!(generation, error = %format!("{:#}", e), "index rebuild failed");
                return Err(IndexError::BuildFailure(e));
            }
        };

        let snapshot = Arc::new(snapshot);
        let previous = self.publish(Arc::clone(&snapshot));
        let report = RebuildReport {
            generation,
            snapshot_id: snapshot.id().to_string(),
            documents,
            chunks: snapshot.len(),
            topics: snapshot.topic_counts().len(),
            elapsed_ms: started.elapsed().as_millis(),
        };
        info!(
            generation,
            previous_generation = previous.generation(),
            documents = report.documents,
            chunks = report.chunks,
            topics = report.topics,
            elapsed_ms = report.elapsed_ms as u64,
            "index snapshot published"
        );
        Ok(report)
    }

    async fn build_and_persist(&self, generation: u64) -> anyhow::Result<(Snapshot, usize)> {
        let documents = self
            .store
            .list_documents()
            .await
            .context("failed to read documents")?;
        let snapshot = self.builder.build(&documents, generation).await?;
        if let Some(dir) = &self.persist_dir {
            persist_snapshot(dir, &snapshot).await?;
        }
        Ok((snapshot, documents.len()))
    }

    /// Swap the active pointer, returning the snapshot it replaced.
    fn publish(&self, snapshot: Arc<Snapshot>) -> Arc<Snapshot> {
        let mut guard = self.active.write().unwrap_or_else(|e| e.into_inner());
        std::mem::replace(&mut *guard, snapshot)
    }

    /// Install the persisted snapshot, if any, without embedding anything.
    ///
    /// Returns the restored generation, or `None` when persistence is off,
    /// no file exists, or the file is unusable (logged and ignored).
    pub async fn warm_start(&self) -> Result<Option<u64>, IndexError> {
        let dir = match &self.persist_dir {
            Some(dir) => dir,
            None => return Ok(None),
        };
        let _permit = self
            .rebuild_slot
            .try_acquire()
            .map_err(|_| IndexError::RebuildInProgress)?;

        let path = dir.join(SNAPSHOT_FILE);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not read persisted snapshot");
                return Ok(None);
            }
        };
        let snapshot = match Snapshot::from_json(&bytes) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(path = %path.display(), error = %format!("{:#}", e), "ignoring unreadable snapshot");
                return Ok(None);
            }
        };
        if snapshot.model() != self.builder.model_name() {
            warn!(
                stored_model = snapshot.model(),
                configured_model = self.builder.model_name(),
                "ignoring snapshot built with a different embedding model"
            );
            return Ok(None);
        }

        let generation = snapshot.generation();
        info!(generation, chunks = snapshot.len(), "restored persisted index snapshot");
        self.publish(Arc::new(snapshot));
        Ok(Some(generation))
    }

    pub fn stats(&self) -> IndexStats {
        let snapshot = self.snapshot();
        IndexStats {
            generation: snapshot.generation(),
            snapshot_id: snapshot.id().to_string(),
            built_at: snapshot.built_at().to_rfc3339(),
            model: snapshot.model().to_string(),
            chunks: snapshot.len(),
            topics: snapshot
                .topic_counts()
                .into_iter()
                .map(|(topic, chunks)| TopicStats { topic, chunks })
                .collect(),
        }
    }
}

/// Write to a temp file, then rename over the live file.
async fn persist_snapshot(dir: &Path, snapshot: &Snapshot) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("failed to create index dir {}", dir.display()))?;
    let bytes = snapshot.to_json()?;
    let tmp = dir.join(SNAPSHOT_TMP_FILE);
    tokio::fs::write(&tmp, bytes)
        .await
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, dir.join(SNAPSHOT_FILE))
        .await
        .context("failed to move snapshot into place")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ragdesk_core::store::memory::InMemoryDocumentStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// One-hot embedder: dimension picked by the first byte of the text.
    struct FirstLetterEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for FirstLetterEmbedder {
        fn model_name(&self) -> &str {
            "first-letter"
        }

        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0; 26];
                    let b = t.bytes().next().unwrap_or(b'a').to_ascii_lowercase();
                    v[(b.saturating_sub(b'a') as usize).min(25)] = 1.0;
                    v
                })
                .collect())
        }
    }

    struct ShortEmbedder;

    #[async_trait]
    impl Embedder for ShortEmbedder {
        fn model_name(&self) -> &str {
            "short"
        }

        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(vec![vec![1.0]; texts.len().saturating_sub(1)])
        }
    }

    fn builder(embedder: Arc<dyn Embedder>, batch_size: usize) -> IndexBuilder {
        IndexBuilder::new(embedder, 1000, 100, batch_size, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_build_embeds_in_batches() {
        let store = InMemoryDocumentStore::new();
        for i in 0..5 {
            store.append("t", &format!("d{}", i), "apple pie").await.unwrap();
        }
        let docs = store.list_documents().await.unwrap();
        let embedder = Arc::new(FirstLetterEmbedder {
            calls: AtomicUsize::new(0),
        });
        let snapshot = builder(embedder.clone(), 2).build(&docs, 4).await.unwrap();

        assert_eq!(snapshot.len(), 5);
        assert_eq!(snapshot.generation(), 4);
        assert_eq!(snapshot.model(), "first-letter");
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_build_fails_on_vector_count_mismatch() {
        let store = InMemoryDocumentStore::new();
        store.append("t", "a", "one").await.unwrap();
        store.append("t", "b", "two").await.unwrap();
        let docs = store.list_documents().await.unwrap();

        let err = builder(Arc::new(ShortEmbedder), 8)
            .build(&docs, 1)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("returned 1 vectors for 2 chunks"));
    }

    #[tokio::test]
    async fn test_query_uses_published_snapshot() {
        let store = Arc::new(InMemoryDocumentStore::new());
        store.append("fruit", "a", "apple").await.unwrap();
        store.append("fruit", "b", "banana").await.unwrap();
        store.append("tools", "h", "hammer").await.unwrap();

        let embedder = Arc::new(FirstLetterEmbedder {
            calls: AtomicUsize::new(0),
        });
        let manager = IndexManager::new(store, builder(embedder.clone(), 16));
        assert_eq!(manager.snapshot().generation(), 0);
        assert!(manager.query("fruit", &[1.0], 3).is_empty());

        let report = manager.rebuild().await.unwrap();
        assert_eq!(report.generation, 1);
        assert_eq!(report.documents, 3);
        assert_eq!(report.topics, 2);
        assert!(!manager.is_rebuilding());

        let query = embedder.embed_one("b").await.unwrap();
        let hits = manager.query("fruit", &query, 1);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.text, "banana");
        assert!(manager.query("tools", &query, 5).iter().all(|h| h.chunk.topic == "tools"));
    }

    #[tokio::test]
    async fn test_stats_reflect_active_snapshot() {
        let store = Arc::new(InMemoryDocumentStore::new());
        store.append("fruit", "a", "apple").await.unwrap();
        let embedder = Arc::new(FirstLetterEmbedder {
            calls: AtomicUsize::new(0),
        });
        let manager = IndexManager::new(store, builder(embedder, 16));
        manager.rebuild().await.unwrap();

        let stats = manager.stats();
        assert_eq!(stats.generation, 1);
        assert_eq!(stats.chunks, 1);
        assert_eq!(stats.topics.len(), 1);
        assert_eq!(stats.topics[0].topic, "fruit");
    }
}
