//! HTTP surface over [`Assistant::answer`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/chat` | `{chat_history, user_config, question}` → `{reply, update}` |
//! | `GET`  | `/health` | Liveness plus index readiness and version |
//!
//! `chatHistory` and `currentConfig` are accepted as aliases.
//!
//! # Startup
//!
//! The listener is bound before the index is built, so `/health` answers
//! immediately. Until the assistant is ready, `/chat` returns 503. If
//! initialization fails the server stops with that error.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" },
//!   "detail": "question must not be empty" }
//! ```
//!
//! | Code | Status |
//! |------|--------|
//! | `bad_request` | 400 |
//! | `service_unavailable` | 503 |
//! | `generation_exhausted` | 500 |
//! | `model_unavailable` | 502 |
//! | `internal` | 500 |

use anyhow::anyhow;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::assistant::Assistant;
use crate::config::Config;
use crate::error::CopilotError;
use crate::models::{AnswerRequest, StructuredResult};

/// Shared handler state. The assistant slot is filled once startup finishes.
#[derive(Clone)]
pub struct AppState {
    assistant: Arc<OnceCell<Assistant>>,
}

impl AppState {
    /// State whose assistant is still initializing.
    pub fn pending() -> Self {
        Self {
            assistant: Arc::new(OnceCell::new()),
        }
    }

    pub fn ready(assistant: Assistant) -> Self {
        Self {
            assistant: Arc::new(OnceCell::new_with(Some(assistant))),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.assistant.initialized()
    }

    /// Install the assistant. Fails if one is already installed.
    pub fn install(&self, assistant: Assistant) -> anyhow::Result<()> {
        self.assistant
            .set(assistant)
            .map_err(|_| anyhow!("assistant already initialized"))
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/chat", post(handle_chat))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Bind `[server].bind`, then build the assistant while already serving.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let state = AppState::pending();
    let app = router(state.clone());

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(bind = %bind_addr, "listening");
    println!("Copilot server listening on http://{}", bind_addr);

    let init = async {
        let assistant = Assistant::from_config(config).await?;
        state.install(assistant)?;
        info!("assistant ready, accepting /chat");
        std::future::pending::<()>().await;
        Ok::<(), anyhow::Error>(())
    };

    tokio::select! {
        served = axum::serve(listener, app) => served?,
        init_result = init => {
            if let Err(e) = &init_result {
                error!(error = %e, "initialization failed, shutting down");
            }
            init_result?
        }
    }

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
    /// Same text as `error.message`, for clients reading a flat `detail`.
    detail: String,
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
            detail: self.message.clone(),
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

fn not_ready() -> AppError {
    AppError {
        status: StatusCode::SERVICE_UNAVAILABLE,
        code: "service_unavailable".to_string(),
        message: "LLM pipeline not ready".to_string(),
    }
}

impl From<CopilotError> for AppError {
    fn from(err: CopilotError) -> Self {
        let status = match &err {
            CopilotError::IndexNotReady => StatusCode::SERVICE_UNAVAILABLE,
            CopilotError::GenerationExhausted { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            CopilotError::Generator(_) | CopilotError::Embedding(_) => StatusCode::BAD_GATEWAY,
            CopilotError::Ingestion(_) | CopilotError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let code = match &err {
            CopilotError::Ingestion(_) => "internal",
            other => other.code(),
        };
        AppError {
            status,
            code: code.to_string(),
            message: err.to_string(),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    ready: bool,
    version: String,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        ready: state.is_ready(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /chat ============

async fn handle_chat(
    State(state): State<AppState>,
    payload: Result<Json<AnswerRequest>, JsonRejection>,
) -> Result<Json<StructuredResult>, AppError> {
    let Json(request) = payload.map_err(|rejection| bad_request(rejection.body_text()))?;

    if request.question.trim().is_empty() {
        return Err(bad_request("question must not be empty"));
    }
    if !request.current_config.is_object() {
        return Err(bad_request("user_config must be a JSON object"));
    }

    let assistant = state.assistant.get().ok_or_else(not_ready)?;

    let started = Instant::now();
    match assistant.answer_with_attempts(&request).await {
        Ok(answer) => {
            info!(
                attempts = answer.attempts,
                update_keys = answer.result.update.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "chat answered"
            );
            Ok(Json(answer.result))
        }
        Err(e) => {
            warn!(
                code = e.code(),
                error = %e,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "chat failed"
            );
            Err(e.into())
        }
    }
}
