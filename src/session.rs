//! Per-user session state.
//!
//! A [`Session`] holds everything the admission controller and the
//! conversation engine know about one user: the selected topic, the
//! dialogue history, whether a human operator has taken over, and the
//! daily question quota.
//!
//! Sessions live in a [`SessionStore`] behind one async mutex each, so two
//! messages from the same user are handled one after the other while
//! different users never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, Utc};
use tokio::sync::Mutex as AsyncMutex;

use ragdesk_core::models::{Exchange, UserId};

/// Source of "today" for quota accounting.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Calendar date in UTC.
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

/// Derived view of a session used for routing decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    NoTopic,
    Active(String),
    InSupport,
}

/// Questions answered on `date`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub date: NaiveDate,
    pub count: u32,
}

impl Default for Quota {
    fn default() -> Self {
        Self {
            date: NaiveDate::MIN,
            count: 0,
        }
    }
}

impl Quota {
    /// Count one question against `limit`, resetting first if `today` is a
    /// new date. Returns `false`, leaving the count untouched, when the
    /// limit is already reached.
    pub fn try_consume(&mut self, today: NaiveDate, limit: u32) -> bool {
        if self.date != today {
            self.date = today;
            self.count = 0;
        }
        if self.count >= limit {
            return false;
        }
        self.count += 1;
        true
    }
}

#[derive(Debug, Default)]
pub struct Session {
    selected_topic: Option<String>,
    history: Vec<Exchange>,
    support_mode: bool,
    quota: Quota,
}

impl Session {
    /// Support mode wins over topic selection.
    pub fn state(&self) -> SessionState {
        if self.support_mode {
            return SessionState::InSupport;
        }
        match &self.selected_topic {
            Some(topic) => SessionState::Active(topic.clone()),
            None => SessionState::NoTopic,
        }
    }

    pub fn selected_topic(&self) -> Option<&str> {
        self.selected_topic.as_deref()
    }

    pub fn select_topic(&mut self, topic: impl Into<String>) {
        self.selected_topic = Some(topic.into());
    }

    pub fn in_support(&self) -> bool {
        self.support_mode
    }

    pub fn start_support(&mut self) {
        self.support_mode = true;
    }

    pub fn end_support(&mut self) {
        self.support_mode = false;
    }

    pub fn history(&self) -> &[Exchange] {
        &self.history
    }

    /// Append an exchange, keeping at most `max_history` of the most
    /// recent ones. `0` keeps everything.
    pub fn record_exchange(&mut self, exchange: Exchange, max_history: usize) {
        self.history.push(exchange);
        if max_history > 0 && self.history.len() > max_history {
            let excess = self.history.len() - max_history;
            self.history.drain(..excess);
        }
    }

    pub fn quota(&self) -> Quota {
        self.quota
    }

    pub fn try_consume_quota(&mut self, today: NaiveDate, limit: u32) -> bool {
        self.quota.try_consume(today, limit)
    }
}

/// Registry of sessions keyed by user id. Sessions are created on first use.
#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<UserId, Arc<AsyncMutex<Session>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The session for `user_id`. Lock it for the duration of one message.
    pub fn handle(&self, user_id: UserId) -> Arc<AsyncMutex<Session>> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(sessions.entry(user_id).or_default())
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
