//! HTTP routes for the Vertex AI proxy

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::proxy::{ProxyConfig, TokenProvider};

/// Upstream request timeout, matching the longest expected generation
const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(60);

/// Shared state for the proxy routes
#[derive(Clone)]
pub struct AppState {
    pub config: ProxyConfig,
    pub tokens: Arc<dyn TokenProvider>,
    pub client: reqwest::Client,
}

impl AppState {
    pub fn new(config: ProxyConfig, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            config,
            tokens,
            client: reqwest::Client::new(),
        }
    }
}

/// Browser request body (minimal shape)
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub system: Option<String>,
    #[serde(default)]
    pub image: Option<InlineImage>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineImage {
    pub mime_type: String,
    pub data: String,
}

/// Proxy-level errors, serialized as `{"detail": ...}` like the upstream API
#[derive(Debug)]
pub enum ProxyError {
    /// Request was malformed; nothing was sent upstream
    BadRequest(String),
    /// Upstream answered with an error; status and body are passed through
    Upstream { status: u16, body: Value },
    /// Token acquisition or transport failure
    Internal(String),
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ProxyError::BadRequest(msg) => (StatusCode::BAD_REQUEST, Value::String(msg)),
            ProxyError::Upstream { status, body } => (
                StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                body,
            ),
            ProxyError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, Value::String(msg))
            }
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

/// Build all proxy routes with permissive browser CORS
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/vertex/generate", post(generate_handler))
        .layer(cors)
        .with_state(state)
}

/// GET /health
async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Assemble the Vertex `parts` array: optional system text, optional inline
/// image, then the user text (already validated non-blank).
fn build_parts(text: &str, system: Option<&str>, image: Option<&InlineImage>) -> Vec<Value> {
    let mut parts = Vec::new();

    if let Some(system) = system.map(str::trim).filter(|s| !s.is_empty()) {
        parts.push(json!({ "text": system }));
    }

    if let Some(image) = image {
        if !image.data.is_empty() && !image.mime_type.is_empty() {
            parts.push(json!({
                "inlineData": { "mimeType": image.mime_type, "data": image.data }
            }));
        }
    }

    parts.push(json!({ "text": text }));
    parts
}

/// POST /api/vertex/generate
///
/// Validates the request, fetches a fresh token, forwards to Vertex AI and
/// passes the upstream JSON back verbatim.
async fn generate_handler(
    State(state): State<AppState>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<Value>, ProxyError> {
    // Validate before touching credentials or the network
    let text = req.text.as_deref().unwrap_or("").trim().to_string();
    if text.is_empty() {
        return Err(ProxyError::BadRequest("Missing text.".to_string()));
    }

    let model = req
        .model
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(&state.config.default_model)
        .to_string();

    let parts = build_parts(&text, req.system.as_deref(), req.image.as_ref());
    let payload = json!({ "contents": [{ "role": "user", "parts": parts }] });

    let token = state
        .tokens
        .access_token()
        .await
        .map_err(|e| ProxyError::Internal(e.to_string()))?;

    let url = state.config.generate_url(&model);
    info!("Forwarding generate request (model: {})", model);

    let response = state
        .client
        .post(&url)
        .bearer_auth(token)
        .json(&payload)
        .timeout(UPSTREAM_TIMEOUT)
        .send()
        .await
        .map_err(|e| ProxyError::Internal(e.to_string()))?;

    let status = response.status();
    let body: Value = response.json().await.unwrap_or_else(|_| json!({}));

    if !status.is_success() {
        warn!("Upstream returned {}", status);
        return Err(ProxyError::Upstream {
            status: status.as_u16(),
            body,
        });
    }

    Ok(Json(body))
}
