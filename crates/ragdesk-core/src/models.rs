//! Core data models used throughout ragdesk.
//!
//! These types represent the documents, chunks, retrieval hits, and
//! conversation exchanges that flow between the document store, the index,
//! and the conversation engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a chat user, as assigned by the messaging transport.
pub type UserId = i64;

/// A source document stored in the document store.
///
/// Documents are immutable once written. A topic is simply the set of
/// documents sharing the same `topic` value; it disappears when its last
/// document is deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub topic: String,
    pub title: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// A chunk of a document's text, tagged with the document's topic.
///
/// Chunks are derived data: they are produced fresh on every rebuild and
/// live exactly as long as the snapshot that holds them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: i64,
    pub topic: String,
    pub title: String,
    pub chunk_index: i64,
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
}

/// A chunk returned from a topic-filtered nearest-neighbour query.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Cosine similarity to the query vector, in `[-1.0, 1.0]`.
    pub score: f32,
}

/// One question/answer turn of a user's conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub question: String,
    pub answer: String,
}
