//! Deterministic test doubles shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::{Notify, Semaphore};

use ragdesk::app::{App, AppParts};
use ragdesk::config::{parse_config, Config};
use ragdesk::operator::{OperatorChannel, OperatorMessage};
use ragdesk::session::Clock;
use ragdesk_core::completion::Completer;
use ragdesk_core::embedding::Embedder;
use ragdesk_core::models::Exchange;
use ragdesk_core::store::memory::InMemoryDocumentStore;
use ragdesk_core::store::DocumentStore;

pub const DIMS: usize = 64;

pub fn test_config() -> Config {
    parse_config("[db]\npath = \"unused.sqlite\"\n").unwrap()
}

// ─── Embedders ──────────────────────────────────────────────────────

/// Bag-of-words embedder: each lowercase alphanumeric token adds 1.0 to a
/// dimension picked by its FNV-1a hash.
pub struct HashEmbedder {
    model: String,
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self::named("hash-bow")
    }

    pub fn named(model: &str) -> Self {
        Self {
            model: model.to_string(),
        }
    }

    pub fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0; DIMS];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hash: u64 = 0xcbf29ce484222325;
            for b in token.to_lowercase().bytes() {
                hash ^= b as u64;
                hash = hash.wrapping_mul(0x100000001b3);
            }
            v[(hash % DIMS as u64) as usize] += 1.0;
        }
        v
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }
}

/// Holds every `embed` call until [`GatedEmbedder::release`] is called, and
/// signals [`GatedEmbedder::wait_entered`] once a call is waiting.
pub struct GatedEmbedder {
    gate: Semaphore,
    entered: Notify,
}

impl GatedEmbedder {
    pub fn new() -> Self {
        Self {
            gate: Semaphore::new(0),
            entered: Notify::new(),
        }
    }

    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self, calls: usize) {
        self.gate.add_permits(calls);
    }
}

#[async_trait]
impl Embedder for GatedEmbedder {
    fn model_name(&self) -> &str {
        "hash-bow"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.entered.notify_one();
        self.gate.acquire().await?.forget();
        Ok(texts.iter().map(|t| HashEmbedder::vector(t)).collect())
    }
}

/// Hash embedder that fails while `fail` is set.
pub struct SwitchableEmbedder {
    pub fail: AtomicBool,
}

impl SwitchableEmbedder {
    pub fn new() -> Self {
        Self {
            fail: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Embedder for SwitchableEmbedder {
    fn model_name(&self) -> &str {
        "hash-bow"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("embedding service unavailable");
        }
        Ok(texts.iter().map(|t| HashEmbedder::vector(t)).collect())
    }
}

// ─── Completers ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CompletionCall {
    pub question: String,
    pub context: Vec<String>,
    pub history: Vec<Exchange>,
}

/// Answers with the retrieved context and records every call.
#[derive(Default)]
pub struct RecordingCompleter {
    calls: Mutex<Vec<CompletionCall>>,
}

impl RecordingCompleter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<CompletionCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Completer for RecordingCompleter {
    async fn complete(&self, question: &str, context: &[String], history: &[Exchange]) -> Result<String> {
        self.calls.lock().unwrap().push(CompletionCall {
            question: question.to_string(),
            context: context.to_vec(),
            history: history.to_vec(),
        });
        Ok(format!("From our records: {}", context.join(" | ")))
    }
}

/// Holds every `complete` call until [`GatedCompleter::release`], then
/// answers with the retrieved context.
pub struct GatedCompleter {
    gate: Semaphore,
    entered: Notify,
    pub calls: Mutex<Vec<CompletionCall>>,
}

impl GatedCompleter {
    pub fn new() -> Self {
        Self {
            gate: Semaphore::new(0),
            entered: Notify::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self, calls: usize) {
        self.gate.add_permits(calls);
    }
}

#[async_trait]
impl Completer for GatedCompleter {
    async fn complete(&self, question: &str, context: &[String], history: &[Exchange]) -> Result<String> {
        self.calls.lock().unwrap().push(CompletionCall {
            question: question.to_string(),
            context: context.to_vec(),
            history: history.to_vec(),
        });
        self.entered.notify_one();
        self.gate.acquire().await?.forget();
        Ok(format!("From our records: {}", context.join(" | ")))
    }
}

#[derive(Default)]
pub struct FailingCompleter {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Completer for FailingCompleter {
    async fn complete(&self, _: &str, _: &[String], _: &[Exchange]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(anyhow!("completion service returned 503"))
    }
}

// ─── Operator channel and clock ─────────────────────────────────────

#[derive(Default)]
pub struct RecordingOperator {
    messages: Mutex<Vec<OperatorMessage>>,
    pub fail: AtomicBool,
}

impl RecordingOperator {
    pub fn texts(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.text.clone())
            .collect()
    }
}

#[async_trait]
impl OperatorChannel for RecordingOperator {
    async fn relay(&self, message: OperatorMessage) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("operator chat unreachable");
        }
        self.messages.lock().unwrap().push(message);
        Ok(())
    }
}

pub struct ManualClock {
    today: Mutex<NaiveDate>,
}

impl ManualClock {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today: Mutex::new(today),
        }
    }

    pub fn advance_days(&self, days: u64) {
        let mut today = self.today.lock().unwrap();
        *today = *today + chrono::Days::new(days);
    }
}

impl Clock for ManualClock {
    fn today(&self) -> NaiveDate {
        *self.today.lock().unwrap()
    }
}

// ─── App harness ────────────────────────────────────────────────────

pub struct Harness {
    pub app: App,
    pub store: Arc<InMemoryDocumentStore>,
    pub completer: Arc<RecordingCompleter>,
    pub operator: Arc<RecordingOperator>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new(config: Config) -> Self {
        Self::with_completer(config, Arc::new(RecordingCompleter::new()))
    }

    pub fn with_completer(config: Config, completer: Arc<RecordingCompleter>) -> Self {
        Self::build(config, completer.clone(), completer)
    }

    pub fn build(
        config: Config,
        completer: Arc<dyn Completer>,
        recording: Arc<RecordingCompleter>,
    ) -> Self {
        let store = Arc::new(InMemoryDocumentStore::new());
        let operator = Arc::new(RecordingOperator::default());
        let clock = Arc::new(ManualClock::new(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()));
        let app = App::assemble(
            config,
            AppParts {
                store: store.clone() as Arc<dyn DocumentStore>,
                embedder: Arc::new(HashEmbedder::new()),
                completer,
                operator: operator.clone(),
                clock: clock.clone(),
            },
        );
        Self {
            app,
            store,
            completer: recording,
            operator,
            clock,
        }
    }
}
