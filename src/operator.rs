//! Hand-off channel to human operators.
//!
//! While a user is in support mode their messages are relayed verbatim
//! through an [`OperatorChannel`]. [`OperatorQueue`] is the in-process
//! implementation: a tokio channel the server drains into the log.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

use ragdesk_core::models::UserId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperatorMessage {
    pub user_id: UserId,
    pub text: String,
    pub received_at: DateTime<Utc>,
}

impl OperatorMessage {
    pub fn new(user_id: UserId, text: impl Into<String>) -> Self {
        Self {
            user_id,
            text: text.into(),
            received_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait OperatorChannel: Send + Sync {
    async fn relay(&self, message: OperatorMessage) -> Result<()>;
}

/// Unbounded in-process queue of messages awaiting an operator.
pub struct OperatorQueue {
    tx: mpsc::UnboundedSender<OperatorMessage>,
}

impl OperatorQueue {
    /// Returns the queue and the receiving end the operator side consumes.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OperatorMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl OperatorChannel for OperatorQueue {
    async fn relay(&self, message: OperatorMessage) -> Result<()> {
        self.tx
            .send(message)
            .map_err(|_| anyhow!("operator queue is closed"))
    }
}
