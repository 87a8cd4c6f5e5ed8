//! JSON HTTP adapter.
//!
//! Thin glue between a chat front-end (or an operator console) and the
//! library API. Every user-facing call goes through the admission
//! controller; admin calls go through the admin workflow.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version and index generation) |
//! | `GET`    | `/topics` | Topics present in the document store |
//! | `POST`   | `/topics/select` | Select a topic for a user |
//! | `POST`   | `/messages` | Route one user message |
//! | `POST`   | `/admin/documents` | Add a document and rebuild |
//! | `DELETE` | `/admin/topics/{topic}` | Delete a topic and rebuild |
//! | `POST`   | `/admin/rebuild` | Rebuild the index |
//! | `GET`    | `/admin/index` | Active snapshot statistics |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "topic must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `rebuild_in_progress` (409),
//! `build_failure` (500), `internal` (500).
//!
//! A user message that is declined is not an HTTP error: `/messages` always
//! answers 200 with the route and the reply text.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedReceiver;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use ragdesk_core::models::UserId;

use crate::admin::AdminReport;
use crate::admission::{InboundMessage, Route};
use crate::app::App;
use crate::error::IndexError;
use crate::index::{IndexStats, RebuildReport};
use crate::operator::OperatorMessage;
use crate::session::SessionState;

/// Bind to `[server].bind`, drain the operator queue into the log, and
/// serve until the process is terminated.
pub async fn run_server(app: App, operator_rx: UnboundedReceiver<OperatorMessage>) -> anyhow::Result<()> {
    let bind_addr = app.config.server.bind.clone();
    tokio::spawn(drain_operator_queue(operator_rx));

    let listener = TcpListener::bind(&bind_addr).await?;
    info!(bind = %bind_addr, "ragdesk server listening");
    axum::serve(listener, router(app)).await?;
    Ok(())
}

pub fn router(app: App) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/topics", get(handle_topics))
        .route("/topics/select", post(handle_select_topic))
        .route("/messages", post(handle_message))
        .route("/admin/documents", post(handle_add_document))
        .route("/admin/topics/{topic}", delete(handle_delete_topic))
        .route("/admin/rebuild", post(handle_rebuild))
        .route("/admin/index", get(handle_index_stats))
        .layer(cors)
        .with_state(app)
}

async fn drain_operator_queue(mut rx: UnboundedReceiver<OperatorMessage>) {
    while let Some(message) = rx.recv().await {
        info!(
            user_id = message.user_id,
            received_at = %message.received_at,
            text = %message.text,
            "message for operator"
        );
    }
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<IndexError> for AppError {
    fn from(err: IndexError) -> Self {
        let status = match err {
            IndexError::RebuildInProgress => StatusCode::CONFLICT,
            IndexError::BuildFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: format!("{:#}", err),
    }
}

/// Admin validation failures are client errors; anything else is internal.
fn classify_admin_error(err: anyhow::Error) -> AppError {
    let msg = err.to_string();
    if msg.contains("must not be empty") || msg.contains("cannot derive") {
        bad_request(msg)
    } else {
        internal(err)
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    generation: u64,
}

async fn handle_health(State(app): State<App>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        generation: app.index.snapshot().generation(),
    })
}

// ============ Topics ============

#[derive(Serialize)]
struct TopicsResponse {
    topics: Vec<String>,
}

async fn handle_topics(State(app): State<App>) -> Result<Json<TopicsResponse>, AppError> {
    let topics = app.admin.topics().await.map_err(internal)?;
    Ok(Json(TopicsResponse { topics }))
}

#[derive(Deserialize)]
struct SelectTopicRequest {
    user_id: UserId,
    topic: String,
}

#[derive(Serialize)]
struct SessionResponse {
    user_id: UserId,
    state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    topic: Option<String>,
}

impl SessionResponse {
    fn new(user_id: UserId, state: SessionState) -> Self {
        let (state, topic) = match state {
            SessionState::NoTopic => ("no_topic", None),
            SessionState::Active(topic) => ("active", Some(topic)),
            SessionState::InSupport => ("in_support", None),
        };
        Self { user_id, state, topic }
    }
}

async fn handle_select_topic(
    State(app): State<App>,
    Json(req): Json<SelectTopicRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    if req.topic.trim().is_empty() {
        return Err(bad_request("topic must not be empty"));
    }
    let state = app.admission.select_topic(req.user_id, &req.topic).await;
    Ok(Json(SessionResponse::new(req.user_id, state)))
}

// ============ POST /messages ============

/// A message without `text` is treated as non-text (photo, file, ...).
#[derive(Deserialize)]
struct MessageRequest {
    user_id: UserId,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Serialize)]
struct MessageResponse {
    route: Route,
    reply: String,
}

async fn handle_message(State(app): State<App>, Json(req): Json<MessageRequest>) -> Json<MessageResponse> {
    let message = match req.text {
        Some(text) => InboundMessage::Text(text),
        None => InboundMessage::NonText,
    };
    let route = app.admission.classify_and_route(req.user_id, message).await;
    let reply = route.reply();
    Json(MessageResponse { route, reply })
}

// ============ Admin ============

#[derive(Deserialize)]
struct AddDocumentRequest {
    topic: String,
    #[serde(default)]
    title: String,
    text: String,
}

async fn handle_add_document(
    State(app): State<App>,
    Json(req): Json<AddDocumentRequest>,
) -> Result<Json<AdminReport>, AppError> {
    let report = app
        .admin
        .add_document(&req.topic, &req.title, &req.text)
        .await
        .map_err(classify_admin_error)?;
    Ok(Json(report))
}

async fn handle_delete_topic(
    State(app): State<App>,
    Path(topic): Path<String>,
) -> Result<Json<AdminReport>, AppError> {
    let report = app.admin.delete_topic(&topic).await.map_err(internal)?;
    Ok(Json(report))
}

async fn handle_rebuild(State(app): State<App>) -> Result<Json<RebuildReport>, AppError> {
    Ok(Json(app.admission.admin_triggered_rebuild().await?))
}

async fn handle_index_stats(State(app): State<App>) -> Json<IndexStats> {
    Json(app.index.stats())
}
