//! Health check handler

use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, Json};
use once_cell::sync::Lazy;

use crate::models::{HealthResponse, HealthStatus};
use crate::AppState;

/// Server start time for uptime calculation
static START_TIME: Lazy<Instant> = Lazy::new(Instant::now);

/// Health check endpoint; degraded when the container runtime stops answering
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let runtime_version = state.orchestrator.runtime().version().await;

    let status = if runtime_version.is_some() {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: START_TIME.elapsed().as_secs(),
        active_sessions: state.orchestrator.active_session_count().await,
        runtime_version,
    })
}
