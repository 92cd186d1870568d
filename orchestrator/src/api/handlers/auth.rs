//! Signup and login handlers

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};

use crate::api::ApiError;
use crate::models::{LoginRequest, SignupRequest, SignupResponse, TokenResponse};
use crate::AppState;

/// Create an account
pub async fn signup(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SignupRequest>,
) -> Result<(StatusCode, Json<SignupResponse>), ApiError> {
    let created = state
        .auth_gate
        .signup(&request.username, &request.password)
        .await?;

    let status = if created.approved {
        StatusCode::CREATED
    } else {
        StatusCode::ACCEPTED
    };

    Ok((
        status,
        Json(SignupResponse {
            username: created.identity,
            approved: created.approved,
            is_admin: created.is_admin,
        }),
    ))
}

/// Exchange credentials for a bearer token
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let token = state
        .auth_gate
        .login(&request.username, &request.password)
        .await?;

    Ok(Json(TokenResponse {
        token: token.token,
        token_type: "Bearer".to_string(),
        expires_in: token.expires_in,
    }))
}
