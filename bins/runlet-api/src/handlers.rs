// HTTP route handlers for the Runlet API

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;
use tracing::info;

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub code: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_language() -> String {
    "python".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

/// POST /execute - Run a code snippet and return its captured output
pub async fn execute(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ExecuteRequest>,
) -> impl IntoResponse {
    info!(
        language = %payload.language,
        timeout_secs = payload.timeout_secs,
        code_bytes = payload.code.len(),
        "execution request received"
    );

    let result = state
        .router
        .submit(
            &payload.code,
            &payload.language,
            Duration::from_secs(payload.timeout_secs),
        )
        .await;

    info!(status = ?result.status, "execution request completed");
    (StatusCode::OK, Json(result))
}

/// GET /health - Liveness/readiness probe with live job count
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let active_jobs = state.router.active_jobs().await;
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "healthy",
            "backend": state.router.backend_name(),
            "active_jobs": active_jobs,
        })),
    )
}

/// GET /metrics - Operational counters for monitoring
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let active_jobs = state.router.active_jobs().await;
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "backend": state.router.backend_name(),
            "active_jobs": active_jobs,
        })),
    )
}

/// GET /version
pub async fn version() -> impl IntoResponse {
    (StatusCode::OK, env!("CARGO_PKG_VERSION"))
}
