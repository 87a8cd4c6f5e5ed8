//! Typed errors at the seams where callers branch on the failure kind.
//!
//! Application plumbing (config, database setup, CLI) uses `anyhow`.

use thiserror::Error;

/// Failures of [`IndexManager::rebuild`](crate::index::IndexManager::rebuild).
#[derive(Debug, Error)]
pub enum IndexError {
    /// Another rebuild holds the single rebuild slot. Retry later or ignore:
    /// the running rebuild reads the store after it started.
    #[error("an index rebuild is already in progress")]
    RebuildInProgress,

    /// Reading, chunking, embedding, or persisting failed. The previously
    /// active snapshot is still in place.
    #[error("index build failed: {0:#}")]
    BuildFailure(anyhow::Error),
}

/// Failures of the conversation engine.
#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("no topic selected")]
    NoTopicSelected,

    /// Embedding or completion failed or timed out. Not retried here.
    #[error("upstream call failed: {0:#}")]
    UpstreamFailure(anyhow::Error),
}

impl IndexError {
    /// Machine-readable code used by the HTTP adapter.
    pub fn code(&self) -> &'static str {
        match self {
            IndexError::RebuildInProgress => "rebuild_in_progress",
            IndexError::BuildFailure(_) => "build_failure",
        }
    }
}
