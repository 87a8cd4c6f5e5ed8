//! Wiring of the long-lived components.
//!
//! [`App::assemble`] connects already constructed backends; tests use it
//! with in-memory stores and fake models. [`App::open`] builds the
//! production backends from config: SQLite store, configured providers, the
//! in-process operator queue, and the system clock.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::info;

use ragdesk_core::completion::Completer;
use ragdesk_core::embedding::Embedder;
use ragdesk_core::store::DocumentStore;

use crate::admin::AdminWorkflow;
use crate::admission::AdmissionController;
use crate::completion::create_completer;
use crate::config::Config;
use crate::conversation::{ConversationEngine, ConversationSettings};
use crate::db;
use crate::embedding::create_embedder;
use crate::index::{IndexBuilder, IndexManager};
use crate::migrate::migrate_pool;
use crate::operator::{OperatorChannel, OperatorMessage, OperatorQueue};
use crate::session::{Clock, SessionStore, SystemClock};
use crate::sqlite_store::SqliteDocumentStore;

/// Backends the application is assembled from.
pub struct AppParts {
    pub store: Arc<dyn DocumentStore>,
    pub embedder: Arc<dyn Embedder>,
    pub completer: Arc<dyn Completer>,
    pub operator: Arc<dyn OperatorChannel>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Clone)]
pub struct App {
    pub config: Arc<Config>,
    pub store: Arc<dyn DocumentStore>,
    pub index: Arc<IndexManager>,
    pub sessions: Arc<SessionStore>,
    pub engine: Arc<ConversationEngine>,
    pub admission: Arc<AdmissionController>,
    pub admin: Arc<AdminWorkflow>,
}

impl App {
    /// Serves the empty snapshot until the first rebuild or warm start.
    pub fn assemble(config: Config, parts: AppParts) -> Self {
        let builder = IndexBuilder::from_config(Arc::clone(&parts.embedder), &config);
        let index = Arc::new(
            IndexManager::new(Arc::clone(&parts.store), builder)
                .with_persist_dir(config.index.dir.clone()),
        );
        let sessions = Arc::new(SessionStore::new());
        let engine = Arc::new(ConversationEngine::new(
            Arc::clone(&index),
            parts.embedder,
            parts.completer,
            Arc::clone(&sessions),
            ConversationSettings::from_config(&config),
        ));
        let admission = Arc::new(AdmissionController::new(
            Arc::clone(&sessions),
            Arc::clone(&engine),
            Arc::clone(&index),
            parts.operator,
            parts.clock,
            config.admission.clone(),
        ));
        let admin = Arc::new(AdminWorkflow::new(Arc::clone(&parts.store), Arc::clone(&index)));

        Self {
            config: Arc::new(config),
            store: parts.store,
            index,
            sessions,
            engine,
            admission,
            admin,
        }
    }

    /// Open the production application and restore the persisted index.
    ///
    /// Returns the receiving end of the operator queue alongside the app.
    pub async fn open(config: Config) -> Result<(Self, UnboundedReceiver<OperatorMessage>)> {
        let pool = db::connect(&config).await?;
        migrate_pool(&pool).await?;

        let embedder = create_embedder(&config.embedding)?;
        let completer = create_completer(&config.completion)?;
        let (queue, operator_rx) = OperatorQueue::new();

        let app = Self::assemble(
            config,
            AppParts {
                store: Arc::new(SqliteDocumentStore::new(pool)),
                embedder,
                completer,
                operator: Arc::new(queue),
                clock: Arc::new(SystemClock),
            },
        );

        if let Some(generation) = app
            .index
            .warm_start()
            .await
            .context("failed to restore persisted index")?
        {
            info!(generation, "warm start complete");
        }
        Ok((app, operator_rx))
    }
}
