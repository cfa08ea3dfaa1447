//! HTTP and WebSocket handlers.

pub mod chat;
pub mod image;
pub mod upload;

use axum::{Json, extract::State};
use serde::Serialize;

use crate::AppState;

/// Liveness payload.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub sessions: usize,
    pub provider_configured: bool,
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        sessions: state.sessions.len(),
        provider_configured: state.gateway.provider_configured(),
    })
}
