//! API module for the Corral orchestrator
//!
//! Provides REST API endpoints for:
//! - Signup and login
//! - Per-user session start, stop, status and activity
//! - Admin operations
//! - Health checks and metrics

mod auth;
mod error;
mod handlers;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::AppState;

pub use auth::{AdminAuth, UserAuth};
pub use error::ApiError;

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        // Health check (no auth)
        .route("/health", get(handlers::health::health_check))
        .nest("/api/v1", api_v1_routes());

    if state.config.metrics.enabled {
        // Prometheus metrics (no auth for scraping)
        router = router.route("/metrics", get(crate::metrics::metrics_handler));
    }

    router.with_state(state)
}

/// API v1 routes
fn api_v1_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Auth endpoints (no token)
        .route("/auth/signup", post(handlers::auth::signup))
        .route("/auth/login", post(handlers::auth::login))
        // Session endpoints
        .route(
            "/sessions/:owner",
            post(handlers::session::start_session)
                .get(handlers::session::get_session)
                .delete(handlers::session::stop_session),
        )
        .route(
            "/sessions/:owner/activity",
            post(handlers::session::record_activity),
        )
        // Admin endpoints
        .nest("/admin", admin_routes())
}

/// Admin API routes
fn admin_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sessions", get(handlers::admin::list_sessions))
        .route("/users/:identity/approve", post(handlers::admin::approve_user))
        .route("/users/:identity/elevate", post(handlers::admin::elevate_user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthGate;
    use crate::config::AppConfig;
    use crate::container::{ContainerStatus, MockContainerRuntime, SessionOrchestrator};
    use crate::models::{SessionInfo, TokenResponse};
    use crate::store::{AccountTable, SessionTable};
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;
    use tower::ServiceExt;

    async fn app(runtime: MockContainerRuntime) -> (Router, TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.data_dir = temp_dir.path().to_path_buf();
        config.auth.admin_users = vec!["root".to_string()];
        config.spawner.health_check_timeout_seconds = 1;
        config.spawner.health_poll_interval_ms = 10;

        let accounts = Arc::new(AccountTable::open(temp_dir.path(), "accounts.json").await.unwrap());
        let sessions = Arc::new(SessionTable::open(temp_dir.path(), "sessions.json").await.unwrap());
        let auth_gate = Arc::new(AuthGate::new(
            config.auth.clone(),
            accounts,
            b"router-test-secret-router-test-secret",
        ));
        let orchestrator = Arc::new(
            SessionOrchestrator::new(
                config.spawner.clone(),
                config.idle.clone(),
                Arc::new(runtime),
                sessions,
            )
            .unwrap(),
        );

        let state = Arc::new(AppState {
            config,
            auth_gate,
            orchestrator,
        });
        (create_router(state), temp_dir)
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn token_for(app: &Router, username: &str) -> String {
        let credentials = json!({ "username": username, "password": "a long passphrase" });
        let response = app
            .clone()
            .oneshot(post_json("/api/v1/auth/signup", credentials.clone()))
            .await
            .unwrap();
        assert!(response.status().is_success());

        let response = app
            .clone()
            .oneshot(post_json("/api/v1/auth/login", credentials))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        body_json::<TokenResponse>(response).await.token
    }

    #[tokio::test]
    async fn test_pending_signup_cannot_login() {
        let (app, _dir) = app(MockContainerRuntime::new()).await;
        let credentials = json!({ "username": "alice", "password": "a long passphrase" });

        let response = app
            .clone()
            .oneshot(post_json("/api/v1/auth/signup", credentials.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let response = app
            .clone()
            .oneshot(post_json("/api/v1/auth/login", credentials))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_sessions_require_token_for_owner() {
        let mut runtime = MockContainerRuntime::new();
        runtime.expect_network_exists().returning(|_| Ok(true));
        runtime.expect_ensure_volume().returning(|_| Ok(()));
        runtime
            .expect_create_container()
            .times(1)
            .returning(|_| Ok("c-bob".to_string()));
        runtime.expect_inspect().returning(|_, _| {
            Ok(ContainerStatus {
                exists: true,
                running: true,
                ip: Some("10.0.0.3".to_string()),
            })
        });

        let (app, _dir) = app(runtime).await;

        let response = app
            .clone()
            .oneshot(Request::post("/api/v1/sessions/bob").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        // configured admins are approved at signup
        let token = token_for(&app, "root").await;
        let response = app
            .clone()
            .oneshot(
                Request::post("/api/v1/sessions/bob")
                    .header(header::AUTHORIZATION, format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let info: SessionInfo = body_json(response).await;
        assert_eq!(info.owner, "bob");
        assert_eq!(info.container_id.as_deref(), Some("c-bob"));
        assert_eq!(info.volume, "corral-user-bob");
    }

    #[tokio::test]
    async fn test_user_cannot_touch_other_session() {
        let (app, _dir) = app(MockContainerRuntime::new()).await;
        let root_token = token_for(&app, "root").await;

        let credentials = json!({ "username": "carol", "password": "a long passphrase" });
        app.clone()
            .oneshot(post_json("/api/v1/auth/signup", credentials.clone()))
            .await
            .unwrap();
        let response = app
            .clone()
            .oneshot(
                Request::post("/api/v1/admin/users/carol/approve")
                    .header(header::AUTHORIZATION, format!("Bearer {}", root_token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .clone()
            .oneshot(post_json("/api/v1/auth/login", credentials))
            .await
            .unwrap();
        let carol_token = body_json::<TokenResponse>(response).await.token;

        let response = app
            .clone()
            .oneshot(
                Request::delete("/api/v1/sessions/bob")
                    .header(header::AUTHORIZATION, format!("Bearer {}", carol_token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .clone()
            .oneshot(
                Request::get("/api/v1/sessions/carol")
                    .header(header::AUTHORIZATION, format!("Bearer {}", carol_token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_health_reports_runtime() {
        let mut runtime = MockContainerRuntime::new();
        runtime
            .expect_version()
            .returning(|| Some("podman version 5.0.0".to_string()));
        let (app, _dir) = app(runtime).await;

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: serde_json::Value = body_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["active_sessions"], 0);
    }
}
