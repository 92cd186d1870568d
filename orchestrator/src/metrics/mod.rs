//! Prometheus metrics export
//!
//! Counters are recorded from anywhere through the free functions below; the
//! recorder is installed once at startup. Without an installed recorder the
//! macros are no-ops, which is what unit tests rely on.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{extract::State, http::StatusCode, response::IntoResponse};
use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

use crate::AppState;

/// Prometheus metrics recorder
static METRICS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Initialize metrics system
pub fn init_metrics() -> Result<()> {
    METRICS_HANDLE.get_or_try_init(|| {
        PrometheusBuilder::new()
            .install_recorder()
            .context("Failed to install Prometheus recorder")
    })?;
    Ok(())
}

pub fn record_signup(approved: bool) {
    counter!("corral_signups_total", "approved" => approved.to_string()).increment(1);
}

/// Record a login attempt by outcome
pub fn record_login(outcome: &str) {
    counter!("corral_logins_total", "outcome" => outcome.to_string()).increment(1);
}

pub fn record_lockout() {
    counter!("corral_lockouts_total").increment(1);
}

/// Record session metrics
pub fn record_session_started(owner: &str) {
    counter!("corral_sessions_started_total", "user" => owner.to_string()).increment(1);
    gauge!("corral_active_sessions").increment(1.0);
}

pub fn record_session_stopped(owner: &str) {
    counter!("corral_sessions_stopped_total", "user" => owner.to_string()).increment(1);
    gauge!("corral_active_sessions").decrement(1.0);
}

pub fn record_start_failure(kind: &str) {
    counter!("corral_session_start_failures_total", "kind" => kind.to_string()).increment(1);
}

pub fn record_session_culled() {
    counter!("corral_sessions_culled_total").increment(1);
}

/// Prometheus metrics endpoint handler
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let Some(handle) = METRICS_HANDLE.get() else {
        return (
            StatusCode::NOT_FOUND,
            [("Content-Type", "text/plain")],
            "metrics disabled".to_string(),
        );
    };

    // The gauge drifts when sessions are restored; resync on scrape
    gauge!("corral_active_sessions").set(state.orchestrator.active_session_count().await as f64);

    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        handle.render(),
    )
}
