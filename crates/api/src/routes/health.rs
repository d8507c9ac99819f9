//! Health check endpoints

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub active_principals: usize,
    pub sessions: usize,
    pub security_contexts: usize,
    pub pending_codes: usize,
}

/// Health check endpoint with registry counters
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            active_principals: state.sessions.principal_count(),
            sessions: state.sessions.session_count(),
            security_contexts: state.contexts.len(),
            pending_codes: state.codes.len(),
        }),
    )
}

/// Liveness probe (just returns 200 if the server is running)
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}
