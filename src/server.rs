//! HTTP server for chat front-ends.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/answer` | Answer one message of a conversation |
//! | `GET`  | `/contexts` | Loaded contexts, their sizes and triggers |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! All error responses share one shape:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "text must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `embedding_error` (502), `internal` (500).
//! Requests running past `[server].request_timeout_secs` get a bare 408.
//!
//! # Sessions
//!
//! Conversations are keyed by the caller-supplied `conversation_id`.
//! Messages of one conversation are answered strictly in arrival order;
//! see [`SessionRegistry`].
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser widgets can
//! call the server directly.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tracing::{error, info};

use context_faq_core::clock::{Clock, SystemClock};
use context_faq_core::{FaqError, FaqMatcher, MatchResult};

use crate::config::Config;
use crate::ingest::build_matcher;
use crate::sessions::SessionRegistry;

const SWEEP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    matcher: Arc<FaqMatcher>,
    sessions: Arc<SessionRegistry>,
    clock: Arc<dyn Clock>,
    request_timeout: std::time::Duration,
}

impl AppState {
    pub fn new(matcher: Arc<FaqMatcher>, sessions: Arc<SessionRegistry>, clock: Arc<dyn Clock>) -> Self {
        Self {
            matcher,
            sessions,
            clock,
            request_timeout: std::time::Duration::from_secs(30),
        }
    }

    pub fn with_request_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// State for `matcher` with sessions retained per `[session]`.
    pub fn from_config(config: &Config, matcher: FaqMatcher) -> Self {
        let sessions = SessionRegistry::new(
            config.default_partition(),
            Duration::seconds(config.session.retention_secs as i64),
        );
        Self::new(Arc::new(matcher), Arc::new(sessions), Arc::new(SystemClock)).with_request_timeout(
            std::time::Duration::from_secs(config.server.request_timeout_secs),
        )
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }
}

/// Route table with CORS and the request timeout applied.
pub fn router(state: AppState) -> Router {
    let timeout = TimeoutLayer::new(state.request_timeout);
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/answer", post(handle_answer))
        .route("/contexts", get(handle_contexts))
        .route("/health", get(handle_health))
        .layer(timeout)
        .layer(cors)
        .with_state(state)
}

/// Serve on an already-bound listener until the process is terminated.
pub async fn serve(listener: tokio::net::TcpListener, state: AppState) -> anyhow::Result<()> {
    let sweeper = state
        .sessions
        .clone()
        .spawn_sweeper(state.clock.clone(), SWEEP_INTERVAL);
    let result = axum::serve(listener, router(state)).await;
    sweeper.abort();
    result?;
    Ok(())
}

/// Build the matcher from `config` and serve on `[server].bind`.
///
/// This is the entry point used by `faq serve`.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let matcher = build_matcher(config).await?;
    let state = AppState::from_config(config, matcher);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "FAQ server listening");
    println!("FAQ server listening on http://{}", config.server.bind);

    serve(listener, state).await
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

/// Internal error type that converts into an Axum HTTP response.
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

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

impl From<FaqError> for AppError {
    fn from(err: FaqError) -> Self {
        match err {
            FaqError::EmbeddingService(_) => AppError {
                status: StatusCode::BAD_GATEWAY,
                code: "embedding_error".to_string(),
                message: err.to_string(),
            },
            // Remaining variants mean the matcher was built wrong.
            other => {
                error!(error = %other, "matcher misconfigured");
                AppError {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "internal".to_string(),
                    message: other.to_string(),
                }
            }
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /contexts ============

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ContextInfo {
    pub name: String,
    pub entries: usize,
    pub triggers: Vec<String>,
    pub default: bool,
}

#[derive(Serialize)]
struct ContextListResponse {
    contexts: Vec<ContextInfo>,
}

async fn handle_contexts(State(state): State<AppState>) -> Json<ContextListResponse> {
    let tracker = state.matcher.tracker();
    let contexts = state
        .matcher
        .index()
        .partitions()
        .map(|(partition, entries)| ContextInfo {
            name: partition.to_string(),
            entries,
            triggers: tracker
                .triggers()
                .iter()
                .filter(|t| t.partition() == partition)
                .map(|t| t.pattern().to_string())
                .collect(),
            default: tracker.default_context() == partition,
        })
        .collect();
    Json(ContextListResponse { contexts })
}

// ============ POST /answer ============

#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    pub conversation_id: String,
    pub text: String,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub recipient_id: Option<String>,
}

/// Handler for `POST /answer`.
///
/// Holds the conversation's session lock for the whole turn so the
/// context update and the query see the same state.
async fn handle_answer(
    State(state): State<AppState>,
    Json(req): Json<AnswerRequest>,
) -> Result<Json<MatchResult>, AppError> {
    if req.conversation_id.trim().is_empty() {
        return Err(bad_request("conversation_id must not be empty"));
    }
    if req.text.trim().is_empty() {
        return Err(bad_request("text must not be empty"));
    }

    let handle = state.sessions.get(&req.conversation_id);
    let mut session = handle.lock().await;
    if req.channel_id.is_some() {
        session.channel_id = req.channel_id;
    }
    if req.recipient_id.is_some() {
        session.recipient_id = req.recipient_id;
    }

    let result = state
        .matcher
        .answer(&mut session, &req.text, state.clock.now())
        .await?;
    Ok(Json(result))
}
