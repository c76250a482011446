//! Health and readiness endpoints
//!
//! Both are computed from a stats snapshot and never touch scheduling state.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

use crate::web::{
    AppState,
    responses::{HealthResponse, ReadyResponse},
};

/// Health check endpoint
///
/// Always 200; degradation is reported in the body.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.stats.snapshot().await;
    Json(HealthResponse::from_snapshot(&snapshot))
}

/// Readiness check
///
/// Returns 503 as soon as shutdown has begun, even while jobs drain.
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    if state.shutdown.is_shutting_down() {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyResponse::not_ready("shutting down")),
        )
    } else {
        (StatusCode::OK, Json(ReadyResponse::ready()))
    }
}
