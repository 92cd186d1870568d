//! Admin API handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::info;

use crate::api::{AdminAuth, ApiError};
use crate::models::SessionInfo;
use crate::AppState;

/// Approve a pending signup
pub async fn approve_user(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Path(identity): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.auth_gate.approve(&identity).await?;
    info!(admin = %admin.user_id, identity = %identity, "Signup approved by admin");
    Ok(StatusCode::NO_CONTENT)
}

/// Grant administrator rights
pub async fn elevate_user(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Path(identity): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.auth_gate.elevate(&identity).await?;
    info!(admin = %admin.user_id, identity = %identity, "User elevated by admin");
    Ok(StatusCode::NO_CONTENT)
}

/// List all sessions
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
) -> Json<Vec<SessionInfo>> {
    let mut sessions: Vec<SessionInfo> = state
        .orchestrator
        .list()
        .await
        .iter()
        .map(SessionInfo::from)
        .collect();
    sessions.sort_by(|a, b| a.owner.cmp(&b.owner));
    Json(sessions)
}
