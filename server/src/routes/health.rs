//! Health check endpoint

use axum::{extract::State, Json};
use serde::Serialize;

use tomato_leaf::backend::backend_name;

use crate::state::SharedState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
    pub backend: String,
    pub uptime_seconds: u64,
    pub version: String,
}

/// GET /health - Health check endpoint
pub async fn health_check(State(state): State<SharedState>) -> Json<HealthResponse> {
    let status = if state.model_loaded() { "ok" } else { "degraded" };
    Json(HealthResponse {
        status: status.to_string(),
        model_loaded: state.model_loaded(),
        backend: backend_name().to_string(),
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
