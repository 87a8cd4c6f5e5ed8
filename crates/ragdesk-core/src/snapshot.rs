//! Immutable, topic-partitioned index snapshots.
//!
//! A [`Snapshot`] is the unit the index manager publishes: a fixed set of
//! chunks with their embedding vectors, partitioned by topic so that a
//! nearest-neighbour lookup only scans the chunks of one topic. Snapshots
//! are never mutated after construction; a rebuild produces a new one.
//!
//! Vectors are normalized to unit length on construction, so similarity is
//! a plain dot product at query time.
//!
//! Snapshots serialize to a self-describing JSON document (see
//! [`Snapshot::to_json`]) for warm restarts. Topic partitions are derived
//! data and are recomputed on load.

use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::embedding::{dot, normalize};
use crate::models::{Chunk, ScoredChunk};

const FORMAT_VERSION: u32 = 1;

/// A chunk together with its embedding vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedChunk {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// An immutable index over topic-tagged chunks.
#[derive(Debug)]
pub struct Snapshot {
    id: String,
    generation: u64,
    built_at: DateTime<Utc>,
    model: String,
    entries: Vec<IndexedChunk>,
    /// topic -> positions in `entries`, in insertion order.
    topics: BTreeMap<String, Vec<usize>>,
}

#[derive(Serialize, Deserialize)]
struct SnapshotFile {
    format_version: u32,
    id: String,
    generation: u64,
    built_at: DateTime<Utc>,
    model: String,
    entries: Vec<IndexedChunk>,
}

impl Snapshot {
    /// The snapshot installed before the first rebuild: generation 0, no chunks.
    pub fn empty() -> Self {
        Self::from_parts(
            Uuid::new_v4().to_string(),
            0,
            Utc::now(),
            String::new(),
            Vec::new(),
        )
    }

    /// Assemble a snapshot from embedded chunks.
    pub fn new(generation: u64, model: impl Into<String>, mut entries: Vec<IndexedChunk>) -> Self {
        for entry in entries.iter_mut() {
            normalize(&mut entry.vector);
        }
        Self::from_parts(
            Uuid::new_v4().to_string(),
            generation,
            Utc::now(),
            model.into(),
            entries,
        )
    }

    fn from_parts(
        id: String,
        generation: u64,
        built_at: DateTime<Utc>,
        model: String,
        entries: Vec<IndexedChunk>,
    ) -> Self {
        let mut topics: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (pos, entry) in entries.iter().enumerate() {
            topics
                .entry(entry.chunk.topic.clone())
                .or_default()
                .push(pos);
        }
        Self {
            id,
            generation,
            built_at,
            model,
            entries,
            topics,
        }
    }

    /// Unique id of this snapshot (UUID v4).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Monotonic publication counter; 0 for the initial empty snapshot.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// Embedding model the vectors were produced with.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Topics with at least one chunk, with their chunk counts, sorted by name.
    pub fn topic_counts(&self) -> Vec<(String, usize)> {
        self.topics
            .iter()
            .map(|(topic, positions)| (topic.clone(), positions.len()))
            .collect()
    }

    /// Number of chunks indexed under `topic`.
    pub fn topic_len(&self, topic: &str) -> usize {
        self.topics.get(topic).map(Vec::len).unwrap_or(0)
    }

    /// The `k` chunks of `topic` most similar to `query`, best first.
    ///
    /// Returns fewer than `k` results when the topic has fewer chunks, and
    /// an empty vector for an unknown topic. Equal scores keep index order.
    pub fn nearest(&self, topic: &str, query: &[f32], k: usize) -> Vec<ScoredChunk> {
        let positions = match self.topics.get(topic) {
            Some(p) if k > 0 => p,
            _ => return Vec::new(),
        };

        let mut query = query.to_vec();
        normalize(&mut query);

        let mut scored: Vec<(usize, f32)> = positions
            .iter()
            .map(|&pos| (pos, dot(&query, &self.entries[pos].vector)))
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k);

        scored
            .into_iter()
            .map(|(pos, score)| ScoredChunk {
                chunk: self.entries[pos].chunk.clone(),
                score,
            })
            .collect()
    }

    /// Serialize to the on-disk JSON format.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        let file = SnapshotFile {
            format_version: FORMAT_VERSION,
            id: self.id.clone(),
            generation: self.generation,
            built_at: self.built_at,
            model: self.model.clone(),
            entries: self.entries.clone(),
        };
        serde_json::to_vec(&file).context("Failed to serialize snapshot")
    }

    /// Parse a snapshot previously written by [`Snapshot::to_json`].
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let file: SnapshotFile =
            serde_json::from_slice(bytes).context("Failed to parse snapshot file")?;
        if file.format_version != FORMAT_VERSION {
            bail!(
                "Unsupported snapshot format version {} (expected {})",
                file.format_version,
                FORMAT_VERSION
            );
        }
        Ok(Self::from_parts(
            file.id,
            file.generation,
            file.built_at,
            file.model,
            file.entries,
        ))
    }
}
