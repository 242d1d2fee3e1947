//! JSON HTTP API.
//!
//! Exposes the chat relay and the permit pipeline to browser clients.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/chat` | Relay a message; returns the assistant reply |
//! | `POST` | `/api/clear` | Reset the caller's session transcript |
//! | `GET`  | `/api/model` | Report the active model |
//! | `POST` | `/api/model` | Select a model from the fixed option list |
//! | `POST` | `/api/permits` | Run the permit ingestion pipeline |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! Chat endpoints report failures as `{ "error": message }`; the permits
//! endpoint reports `{ "status": "error", "message": … }`. Sessions are
//! identified by the opaque `x-session-id` header; requests without one
//! share an anonymous session.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support the
//! browser front-end.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::chat::SessionStore;
use crate::config::Config;
use crate::export;
use crate::models::{PermitRecord, WebResult};
use crate::permits::{self, PermitError, PermitQuery};
use crate::provider::{self, ChatProvider, UPSTREAM_ERROR_REPLY};
use crate::source::{FileBlob, ReportSource};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    sessions: Arc<SessionStore>,
    provider: Arc<ChatProvider>,
}

/// Starts the HTTP server on the configured bind address and runs until
/// the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let state = AppState {
        sessions: Arc::new(SessionStore::new(config.chat.history_limit)),
        provider: Arc::new(ChatProvider::new(config.chat.clone())?),
        config: Arc::new(config.clone()),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/chat", post(handle_chat))
        .route("/api/clear", post(handle_clear))
        .route("/api/model", get(handle_model_get).post(handle_model_post))
        .route("/api/permits", post(handle_permits))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    println!("Permit Desk API listening on http://{}", bind_addr);
    tracing::info!(bind = %bind_addr, "server started");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// The session key supplied by the transport; absent headers share one
/// anonymous session.
fn session_id(headers: &HeaderMap) -> String {
    headers
        .get("x-session-id")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| "anonymous".to_string())
}

// ============ Error response (chat contract) ============

/// Chat-side error: `{ "error": message }` with a status code.
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn bad_gateway(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
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

// ============ POST /api/chat ============

#[derive(Deserialize)]
struct ChatRequest {
    #[serde(default)]
    message: String,
}

#[derive(Serialize)]
struct ChatResponse {
    ai_response: AiMessage,
}

#[derive(Serialize)]
struct AiMessage {
    id: String,
    message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    web_results: Vec<WebResult>,
    model: String,
    timestamp: chrono::DateTime<chrono::Utc>,
}

async fn handle_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let message = request.message.trim();
    if message.is_empty() {
        return Err(ApiError::bad_request("Message cannot be empty"));
    }

    let session = session_id(&headers);
    let context = state.sessions.append_and_build_context(&session, message);
    let preferred = state.sessions.preferred_model(&session);

    let reply = state
        .provider
        .complete(&context, preferred.as_deref())
        .await
        .map_err(|_| ApiError::bad_gateway(UPSTREAM_ERROR_REPLY))?;

    let turn = state.sessions.append_assistant(&session, &reply.message);

    Ok(Json(ChatResponse {
        ai_response: AiMessage {
            id: turn.id,
            message: reply.message,
            web_results: reply.web_results,
            model: reply.model,
            timestamp: turn.timestamp,
        },
    }))
}

// ============ POST /api/clear ============

async fn handle_clear(State(state): State<AppState>, headers: HeaderMap) -> Json<serde_json::Value> {
    state.sessions.clear(&session_id(&headers));
    Json(serde_json::json!({ "success": true }))
}

// ============ GET/POST /api/model ============

#[derive(Deserialize)]
struct ModelRequest {
    #[serde(default)]
    model: String,
}

#[derive(Serialize)]
struct ModelResponse {
    model: String,
    display_name: String,
    is_default: bool,
}

fn model_response(state: &AppState, session: &str) -> ModelResponse {
    let default_model = state.provider.default_model();
    let active = state
        .sessions
        .preferred_model(session)
        .unwrap_or_else(|| default_model.to_string());
    ModelResponse {
        display_name: provider::display_label(&active),
        is_default: active == default_model,
        model: active,
    }
}

async fn handle_model_get(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Json<ModelResponse> {
    Json(model_response(&state, &session_id(&headers)))
}

async fn handle_model_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ModelRequest>,
) -> Result<Json<ModelResponse>, ApiError> {
    let session = session_id(&headers);
    let requested = provider::normalize_requested_model(&request.model);

    if requested == "default" {
        state.sessions.set_preferred_model(&session, None);
    } else if provider::SELECTABLE_MODELS.contains(&requested.as_str()) {
        state.sessions.set_preferred_model(&session, Some(requested));
    } else {
        return Err(ApiError::bad_request(format!(
            "Unsupported model selection: {}",
            request.model
        )));
    }

    Ok(Json(model_response(&state, &session)))
}

// ============ POST /api/permits ============

#[derive(Deserialize)]
struct PermitsRequest {
    #[serde(default)]
    mode: String,
    days: Option<u32>,
    #[serde(default)]
    homeowner_only: bool,
    report_text: Option<String>,
    files: Option<Vec<UploadedFile>>,
    project_code: Option<String>,
    #[serde(default = "default_true")]
    want_rows: bool,
    #[serde(default = "default_true")]
    want_csv: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
struct UploadedFile {
    name: Option<String>,
    #[serde(default)]
    content_base64: String,
}

#[derive(Serialize)]
struct PermitsResponse {
    status: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    row_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rows: Option<Vec<PermitRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    csv_url: Option<String>,
}

fn permits_error(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<PermitsResponse>) {
    (
        status,
        Json(PermitsResponse {
            status: "error",
            message: message.into(),
            row_count: None,
            rows: None,
            csv_url: None,
        }),
    )
}

async fn handle_permits(
    State(state): State<AppState>,
    Json(request): Json<PermitsRequest>,
) -> (StatusCode, Json<PermitsResponse>) {
    // Validate before any I/O; every rejection names the offending field.
    let days = match request.days {
        Some(0) => {
            return permits_error(StatusCode::BAD_REQUEST, "days must be a positive integer");
        }
        Some(days) => days,
        None => state.config.permits.default_days,
    };

    let mut base64_skipped: Vec<String> = Vec::new();
    let source = match request.mode.as_str() {
        "fetch" => ReportSource::Fetch { days },
        "stdin" => {
            let text = request.report_text.unwrap_or_default();
            if text.trim().is_empty() {
                return permits_error(
                    StatusCode::BAD_REQUEST,
                    "report_text is required for mode=\"stdin\"",
                );
            }
            ReportSource::Stdin(text)
        }
        "files" => {
            let files = request.files.unwrap_or_default();
            if files.is_empty() {
                return permits_error(
                    StatusCode::BAD_REQUEST,
                    "at least one entry in files is required for mode=\"files\"",
                );
            }
            let mut blobs = Vec::new();
            for (index, file) in files.into_iter().enumerate() {
                let name = file
                    .name
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| format!("upload_{}.txt", index));
                match BASE64.decode(file.content_base64.as_bytes()) {
                    Ok(bytes) => blobs.push(FileBlob { name, bytes }),
                    // Same policy as undecodable text: skip and report.
                    Err(_) => base64_skipped.push(name),
                }
            }
            if blobs.is_empty() {
                // Every upload failed transport decoding; the rejection
                // must still name the files.
                return permits_error(
                    StatusCode::BAD_REQUEST,
                    format!(
                        "No report content provided. Could not decode file(s): {}.",
                        base64_skipped.join(", ")
                    ),
                );
            }
            ReportSource::Files(blobs)
        }
        other => {
            return permits_error(
                StatusCode::BAD_REQUEST,
                format!("mode must be one of fetch, files, stdin (got \"{}\")", other),
            );
        }
    };

    let query = PermitQuery {
        source,
        days,
        homeowner_only: request.homeowner_only,
        project_code: request.project_code,
    };

    let mut batch = match permits::collect_rows(&state.config, query).await {
        Ok(batch) => batch,
        Err(error) => {
            let status = match &error {
                PermitError::FetchUnavailable(detail) => {
                    tracing::warn!(detail = %detail, "live report fetch failed");
                    StatusCode::SERVICE_UNAVAILABLE
                }
                PermitError::Validation(_) | PermitError::NoContent => StatusCode::BAD_REQUEST,
            };
            return permits_error(status, error.to_string());
        }
    };
    batch.skipped_files.extend(base64_skipped);

    let csv_url = if request.want_csv {
        match export::rows_to_csv(&batch.rows) {
            Ok(csv) => Some(format!(
                "data:text/csv;base64,{}",
                BASE64.encode(csv.as_bytes())
            )),
            Err(error) => {
                tracing::error!(detail = %error, "CSV serialization failed");
                return permits_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "failed to serialize CSV",
                );
            }
        }
    } else {
        None
    };

    let response = PermitsResponse {
        status: "ok",
        message: batch.message(),
        row_count: Some(batch.rows.len()),
        rows: request.want_rows.then_some(batch.rows),
        csv_url,
    };
    (StatusCode::OK, Json(response))
}
