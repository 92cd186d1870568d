//! Session management handlers

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::api::{ApiError, UserAuth};
use crate::models::{SessionInfo, StartSessionRequest};
use crate::AppState;

/// Start the owner's session or return the running one
pub async fn start_session(
    State(state): State<Arc<AppState>>,
    auth: UserAuth,
    Path(owner): Path<String>,
    request: Option<Json<StartSessionRequest>>,
) -> Result<Json<SessionInfo>, ApiError> {
    auth.ensure_can_act_for(&owner)?;
    let request = request.map(|Json(request)| request).unwrap_or_default();

    state.orchestrator.start(&owner, request.image).await?;
    let session = state.orchestrator.status(&owner).await?;

    Ok(Json(SessionInfo::from(&session)))
}

/// Get session info
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    auth: UserAuth,
    Path(owner): Path<String>,
) -> Result<Json<SessionInfo>, ApiError> {
    auth.ensure_can_act_for(&owner)?;
    let session = state.orchestrator.status(&owner).await?;
    Ok(Json(SessionInfo::from(&session)))
}

/// Query parameters for stopping a session
#[derive(Debug, Deserialize)]
pub struct StopQuery {
    #[serde(default = "default_remove")]
    pub remove: bool,
}

fn default_remove() -> bool {
    true
}

/// Stop session; the user's volume is kept
pub async fn stop_session(
    State(state): State<Arc<AppState>>,
    auth: UserAuth,
    Path(owner): Path<String>,
    Query(query): Query<StopQuery>,
) -> Result<StatusCode, ApiError> {
    auth.ensure_can_act_for(&owner)?;
    state.orchestrator.stop(&owner, query.remove).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Record user activity observed by the proxy in front of the session
pub async fn record_activity(
    State(state): State<Arc<AppState>>,
    auth: UserAuth,
    Path(owner): Path<String>,
) -> Result<StatusCode, ApiError> {
    auth.ensure_can_act_for(&owner)?;
    state.orchestrator.touch(&owner).await?;
    Ok(StatusCode::NO_CONTENT)
}
