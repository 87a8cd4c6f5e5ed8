//! Message admission and routing.
//!
//! Every inbound user message goes through [`AdmissionController::classify_and_route`],
//! which locks the user's session, classifies the message, and returns a
//! [`Route`]. Classification order:
//!
//! 1. support keyword → [`Route::SupportStarted`]
//! 2. end-support keyword → [`Route::SupportEnded`]
//! 3. topic keyword → [`Route::TopicListRequested`]
//! 4. in support mode → relay verbatim to the operator channel
//! 5. otherwise a question: topic and quota gating, then the conversation engine
//!
//! Keywords match the trimmed message exactly. Errors below this layer are
//! turned into [`Route::Rejected`] so callers always get something to show.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use ragdesk_core::models::UserId;

use crate::config::AdmissionConfig;
use crate::conversation::ConversationEngine;
use crate::error::{ConversationError, IndexError};
use crate::index::{IndexManager, RebuildReport};
use crate::operator::{OperatorChannel, OperatorMessage};
use crate::session::{Clock, SessionState, SessionStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    Text(String),
    /// Photos, files, stickers and the like.
    NonText,
}

impl InboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        InboundMessage::Text(text.into())
    }
}

/// Why a message was declined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    QuotaExceeded,
    NoTopicSelected,
    EmptyQuestion,
    UnsupportedMessage,
    UpstreamFailure,
    RelayFailed,
    /// Non-text from a privileged user outside the admin upload path.
    UseAdminUpload,
}

impl RejectReason {
    pub fn reply(&self) -> &'static str {
        match self {
            RejectReason::QuotaExceeded => {
                "You have reached today's question limit. Please come back tomorrow."
            }
            RejectReason::NoTopicSelected => "Please choose a topic first.",
            RejectReason::EmptyQuestion => "Please type your question.",
            RejectReason::UnsupportedMessage => "Sorry, I can only answer text messages.",
            RejectReason::UpstreamFailure => {
                "Something went wrong while preparing the answer. Please try again later."
            }
            RejectReason::RelayFailed => {
                "Your message could not be delivered to an operator. Please try again later."
            }
            RejectReason::UseAdminUpload => "To add a document, use the admin upload.",
        }
    }
}

/// Outcome of routing one inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "route", content = "detail", rename_all = "snake_case")]
pub enum Route {
    Answer(String),
    Rejected(RejectReason),
    RelayedToOperator,
    SupportStarted,
    SupportEnded,
    TopicListRequested,
}

impl Route {
    /// The text shown to the user.
    pub fn reply(&self) -> String {
        match self {
            Route::Answer(text) => text.clone(),
            Route::Rejected(reason) => reason.reply().to_string(),
            Route::RelayedToOperator => "Your message has been forwarded to an operator.".to_string(),
            Route::SupportStarted => {
                "You are now talking to a human operator. Send the end-support command to return to the assistant."
                    .to_string()
            }
            Route::SupportEnded => "Support session closed. You can ask questions again.".to_string(),
            Route::TopicListRequested => "Please choose a topic.".to_string(),
        }
    }
}

pub struct AdmissionController {
    sessions: Arc<SessionStore>,
    engine: Arc<ConversationEngine>,
    index: Arc<IndexManager>,
    operator: Arc<dyn OperatorChannel>,
    clock: Arc<dyn Clock>,
    config: AdmissionConfig,
}

impl AdmissionController {
    pub fn new(
        sessions: Arc<SessionStore>,
        engine: Arc<ConversationEngine>,
        index: Arc<IndexManager>,
        operator: Arc<dyn OperatorChannel>,
        clock: Arc<dyn Clock>,
        config: AdmissionConfig,
    ) -> Self {
        Self {
            sessions,
            engine,
            index,
            operator,
            clock,
            config,
        }
    }

    pub fn is_privileged(&self, user_id: UserId) -> bool {
        self.config.privileged_users.contains(&user_id)
    }

    /// Select `topic` for `user_id`. The topic does not need to have any
    /// documents yet; questions about it then get the no-information reply.
    ///
    /// Support mode is left as is.
    pub async fn select_topic(&self, user_id: UserId, topic: &str) -> SessionState {
        let handle = self.sessions.handle(user_id);
        let mut session = handle.lock().await;
        let topic = topic.trim();
        if topic.is_empty() {
            debug!(user_id, "ignoring blank topic selection");
        } else {
            session.select_topic(topic);
            debug!(user_id, topic, "topic selected");
        }
        session.state()
    }

    pub async fn state(&self, user_id: UserId) -> SessionState {
        self.sessions.handle(user_id).lock().await.state()
    }

    pub async fn classify_and_route(&self, user_id: UserId, message: InboundMessage) -> Route {
        let text = match message {
            InboundMessage::Text(text) => text,
            InboundMessage::NonText => {
                let reason = if self.is_privileged(user_id) {
                    RejectReason::UseAdminUpload
                } else {
                    RejectReason::UnsupportedMessage
                };
                debug!(user_id, ?reason, "non-text message declined");
                return Route::Rejected(reason);
            }
        };

        let handle = self.sessions.handle(user_id);
        let mut session = handle.lock().await;
        let trimmed = text.trim();

        if trimmed == self.config.support_keyword {
            session.start_support();
            debug!(user_id, "support started");
            return Route::SupportStarted;
        }
        if trimmed == self.config.end_support_keyword {
            session.end_support();
            debug!(user_id, "support ended");
            return Route::SupportEnded;
        }
        if trimmed == self.config.topic_keyword {
            return Route::TopicListRequested;
        }

        if session.in_support() {
            return match self.operator.relay(OperatorMessage::new(user_id, text)).await {
                Ok(()) => {
                    debug!(user_id, "message relayed to operator");
                    Route::RelayedToOperator
                }
                Err(e) => {
                    warn!(user_id, error = %format!("{:#}", e), "operator relay failed");
                    Route::Rejected(RejectReason::RelayFailed)
                }
            };
        }

        if trimmed.is_empty() {
            return Route::Rejected(RejectReason::EmptyQuestion);
        }
        if session.selected_topic().is_none() {
            return Route::Rejected(RejectReason::NoTopicSelected);
        }
        if !session.try_consume_quota(self.clock.today(), self.config.daily_limit) {
            debug!(user_id, limit = self.config.daily_limit, "daily quota exhausted");
            return Route::Rejected(RejectReason::QuotaExceeded);
        }

        match self.engine.answer_in_session(&mut session, trimmed).await {
            Ok(answer) => Route::Answer(answer),
            Err(ConversationError::NoTopicSelected) => Route::Rejected(RejectReason::NoTopicSelected),
            Err(ConversationError::UpstreamFailure(e)) => {
                warn!(user_id, error = %format!("{:#}", e), "answering failed");
                Route::Rejected(RejectReason::UpstreamFailure)
            }
        }
    }

    /// Rebuild requested from the admin surface. Does not touch any session.
    pub async fn admin_triggered_rebuild(&self) -> Result<RebuildReport, IndexError> {
        self.index.rebuild().await
    }
}
