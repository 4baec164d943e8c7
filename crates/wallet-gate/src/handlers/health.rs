//! Liveness check and unknown-route fallback.

use crate::domain::error::GateError;
use crate::domain::unix_now_secs;
use crate::service::GateState;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub success: bool,
    pub message: String,
    pub timestamp: String,
    pub environment: String,
}

/// `GET /health`
pub async fn health_check(State(state): State<GateState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        success: true,
        message: "Wallet gate is running".into(),
        timestamp: super::auth::rfc3339(unix_now_secs()),
        environment: state.config.mode.to_string(),
    })
}

/// 404 in the standard rejection shape.
pub async fn not_found() -> GateError {
    GateError::NotFound
}
