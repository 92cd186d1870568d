//! Bearer-token extractors

use std::sync::Arc;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::AppState;

use super::ApiError;

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct UserAuth {
    pub user_id: String,
    pub is_admin: bool,
}

impl UserAuth {
    /// Users act on their own sessions; admins on anyone's
    pub fn ensure_can_act_for(&self, owner: &str) -> Result<(), ApiError> {
        if self.is_admin || self.user_id == owner {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!("not allowed to manage {}'s session", owner)))
        }
    }
}

/// Admin-only authentication
#[derive(Debug, Clone)]
pub struct AdminAuth {
    pub user_id: String,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for UserAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .ok_or(ApiError::Unauthorized)?;

        let claims = state
            .auth_gate
            .verify_token(token.trim())
            .map_err(|_| ApiError::Unauthorized)?;

        Ok(UserAuth {
            user_id: claims.sub,
            is_admin: claims.admin,
        })
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user_auth = UserAuth::from_request_parts(parts, state).await?;

        if !user_auth.is_admin {
            return Err(ApiError::Forbidden("administrator required".to_string()));
        }

        Ok(AdminAuth {
            user_id: user_auth.user_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_can_act_for() {
        let user = UserAuth {
            user_id: "alice".to_string(),
            is_admin: false,
        };
        assert!(user.ensure_can_act_for("alice").is_ok());
        assert!(matches!(
            user.ensure_can_act_for("bob"),
            Err(ApiError::Forbidden(_))
        ));

        let admin = UserAuth {
            user_id: "root".to_string(),
            is_admin: true,
        };
        assert!(admin.ensure_can_act_for("bob").is_ok());
    }
}
