//! Answer completion providers.
//!
//! [`OpenAICompleter`] calls `POST /v1/chat/completions`. The retrieved
//! chunks go into the system message, prior exchanges are replayed as
//! alternating user/assistant turns, and the question is the final user
//! turn. [`DisabledCompleter`] always errors.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::Arc;

pub use ragdesk_core::completion::Completer;
use ragdesk_core::models::Exchange;

use crate::config::CompletionConfig;
use crate::upstream;

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

const SYSTEM_PROMPT: &str = "You are a support assistant. Answer the user's question using only \
the context below. If the context does not contain the answer, say that you do not know. \
Answer in the language of the question.";

pub struct DisabledCompleter;

#[async_trait]
impl Completer for DisabledCompleter {
    async fn complete(&self, _: &str, _: &[String], _: &[Exchange]) -> Result<String> {
        bail!("Completion provider is disabled. Set [completion] provider in config.")
    }
}

/// Completer backed by the OpenAI chat completions API.
///
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAICompleter {
    client: reqwest::Client,
    api_key: String,
    url: String,
    model: String,
    temperature: f32,
    max_retries: u32,
}

impl OpenAICompleter {
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Ok(Self {
            client: upstream::client(config.timeout_secs)?,
            api_key,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| OPENAI_CHAT_URL.to_string()),
            model: config.model.clone(),
            temperature: config.temperature,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Completer for OpenAICompleter {
    async fn complete(
        &self,
        question: &str,
        context: &[String],
        history: &[Exchange],
    ) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": build_messages(question, context, history),
        });
        let json = upstream::post_json_with_retry(
            &self.client,
            &self.url,
            Some(&self.api_key),
            &body,
            self.max_retries,
            "OpenAI",
        )
        .await?;
        parse_chat_response(&json)
    }
}

fn build_messages(question: &str, context: &[String], history: &[Exchange]) -> Vec<serde_json::Value> {
    let mut system = String::from(SYSTEM_PROMPT);
    system.push_str("\n\nContext:\n");
    for (i, chunk) in context.iter().enumerate() {
        system.push_str(&format!("\n[{}]\n{}\n", i + 1, chunk));
    }

    let mut messages = Vec::with_capacity(2 + history.len() * 2);
    messages.push(serde_json::json!({ "role": "system", "content": system }));
    for exchange in history {
        messages.push(serde_json::json!({ "role": "user", "content": exchange.question }));
        messages.push(serde_json::json!({ "role": "assistant", "content": exchange.answer }));
    }
    messages.push(serde_json::json!({ "role": "user", "content": question }));
    messages
}

fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    let content = json
        .pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing choices[0].message.content"))?;
    let content = content.trim();
    if content.is_empty() {
        bail!("OpenAI returned an empty answer");
    }
    Ok(content.to_string())
}

/// Create the [`Completer`] named by `completion.provider`.
pub fn create_completer(config: &CompletionConfig) -> Result<Arc<dyn Completer>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledCompleter)),
        "openai" => Ok(Arc::new(OpenAICompleter::new(config)?)),
        other => bail!("Unknown completion provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_messages_carry_context_history_and_question() {
        let history = vec![Exchange {
            question: "Do you sell popcorn?".to_string(),
            answer: "Yes.".to_string(),
        }];
        let context = vec!["open 10:00-22:00".to_string()];
        let messages = build_messages("When do you open?", &context, &history);

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0]["role"], "system");
        assert!(messages[0]["content"]
            .as_str()
            .unwrap()
            .contains("open 10:00-22:00"));
        assert_eq!(messages[1]["content"], "Do you sell popcorn?");
        assert_eq!(messages[2]["role"], "assistant");
        assert_eq!(messages[3]["content"], "When do you open?");
    }

    #[test]
    fn test_parse_chat_response() {
        let body = json!({ "choices": [ { "message": { "role": "assistant", "content": " 10 to 22 " } } ] });
        assert_eq!(parse_chat_response(&body).unwrap(), "10 to 22");
        assert!(parse_chat_response(&json!({ "choices": [] })).is_err());
    }
}
