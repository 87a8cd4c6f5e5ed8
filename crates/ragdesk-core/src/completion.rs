//! Answer completion trait.
//!
//! A [`Completer`] turns a question, the retrieved context chunks, and the
//! user's prior exchanges into an answer. The OpenAI-backed implementation
//! lives in the `ragdesk` app crate.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::Exchange;

#[async_trait]
pub trait Completer: Send + Sync {
    /// Produce an answer to `question` grounded in `context`.
    ///
    /// `context` is never empty when called by the conversation engine:
    /// empty retrieval short-circuits before completion.
    async fn complete(
        &self,
        question: &str,
        context: &[String],
        history: &[Exchange],
    ) -> Result<String>;
}
