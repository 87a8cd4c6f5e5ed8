//! Retrieval-augmented answering.
//!
//! For one question the engine embeds the text, asks the index for the
//! nearest chunks in the session's topic, and hands those chunks plus the
//! session history to the completer. An empty retrieval short-circuits to
//! [`NO_INFORMATION_ANSWER`] without calling the completer.

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use tracing::{debug, info};

use ragdesk_core::completion::Completer;
use ragdesk_core::embedding::Embedder;
use ragdesk_core::models::{Exchange, UserId};

use crate::config::Config;
use crate::error::ConversationError;
use crate::index::IndexManager;
use crate::session::{Session, SessionStore};
use crate::upstream;

/// Reply when the selected topic has no indexed chunks.
pub const NO_INFORMATION_ANSWER: &str =
    "Sorry, I could not find any information about this in the selected topic.";

#[derive(Debug, Clone)]
pub struct ConversationSettings {
    pub top_k: usize,
    pub max_history: usize,
    pub embed_timeout: Duration,
    pub completion_timeout: Duration,
}

impl ConversationSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            top_k: config.retrieval.top_k,
            max_history: config.conversation.max_history,
            embed_timeout: upstream::call_budget(
                config.embedding.timeout_secs,
                config.embedding.max_retries,
            ),
            completion_timeout: upstream::call_budget(
                config.completion.timeout_secs,
                config.completion.max_retries,
            ),
        }
    }
}

pub struct ConversationEngine {
    index: Arc<IndexManager>,
    embedder: Arc<dyn Embedder>,
    completer: Arc<dyn Completer>,
    sessions: Arc<SessionStore>,
    settings: ConversationSettings,
}

impl ConversationEngine {
    pub fn new(
        index: Arc<IndexManager>,
        embedder: Arc<dyn Embedder>,
        completer: Arc<dyn Completer>,
        sessions: Arc<SessionStore>,
        settings: ConversationSettings,
    ) -> Self {
        Self {
            index,
            embedder,
            completer,
            sessions,
            settings,
        }
    }

    /// Answer `question` for `user_id`, locking that user's session for the
    /// whole call.
    pub async fn answer(&self, user_id: UserId, question: &str) -> Result<String, ConversationError> {
        let handle = self.sessions.handle(user_id);
        let mut session = handle.lock().await;
        self.answer_in_session(&mut session, question).await
    }

    /// Answer `question` within an already locked session.
    ///
    /// History is appended only when the completer produced an answer.
    pub async fn answer_in_session(
        &self,
        session: &mut Session,
        question: &str,
    ) -> Result<String, ConversationError> {
        let topic = session
            .selected_topic()
            .ok_or(ConversationError::NoTopicSelected)?
            .to_string();

        let vector = tokio::time::timeout(self.settings.embed_timeout, self.embedder.embed_one(question))
            .await
            .map_err(|_| {
                ConversationError::UpstreamFailure(anyhow!(
                    "question embedding timed out after {}s",
                    self.settings.embed_timeout.as_secs()
                ))
            })?
            .map_err(ConversationError::UpstreamFailure)?;

        let hits = self.index.query(&topic, &vector, self.settings.top_k);
        if hits.is_empty() {
            debug!(topic = %topic, "no chunks for topic");
            return Ok(NO_INFORMATION_ANSWER.to_string());
        }

        let context: Vec<String> = hits.into_iter().map(|hit| hit.chunk.text).collect();
        let answer = tokio::time::timeout(
            self.settings.completion_timeout,
            self.completer.complete(question, &context, session.history()),
        )
        .await
        .map_err(|_| {
            ConversationError::UpstreamFailure(anyhow!(
                "completion timed out after {}s",
                self.settings.completion_timeout.as_secs()
            ))
        })?
        .map_err(ConversationError::UpstreamFailure)?;

        info!(topic = %topic, chunks = context.len(), history = session.history().len(), "question answered");
        session.record_exchange(
            Exchange {
                question: question.to_string(),
                answer: answer.clone(),
            },
            self.settings.max_history,
        );
        Ok(answer)
    }
}
