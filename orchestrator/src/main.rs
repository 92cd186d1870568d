//! Corral orchestrator - per-user container sessions behind a login gate
//!
//! This is the main entry point for the Corral orchestrator service.
//! It drives podman or docker and serves the REST API.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::HeaderName;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use corral_orchestrator::api::create_router;
use corral_orchestrator::auth::{load_or_create_secret, AuthGate};
use corral_orchestrator::config::AppConfig;
use corral_orchestrator::container::{connect_runtime, SessionOrchestrator};
use corral_orchestrator::logging::init_logging;
use corral_orchestrator::reaper::IdleReaper;
use corral_orchestrator::store::{AccountTable, SessionTable};
use corral_orchestrator::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::load()?;

    // Initialize logging
    init_logging(&config.log_level)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Corral orchestrator"
    );

    if config.metrics.enabled {
        corral_orchestrator::metrics::init_metrics()?;
        info!("Prometheus metrics initialized");
    }

    let runtime = connect_runtime(&config.spawner)
        .await
        .context("Failed to connect to container runtime")?;

    // Read once; rotating the secret requires a restart
    let secret = load_or_create_secret(&config.cookie_secret_file)?;

    let accounts = Arc::new(AccountTable::open(&config.data_dir, "accounts.json").await?);
    let sessions = Arc::new(SessionTable::open(&config.data_dir, "sessions.json").await?);

    let auth_gate = Arc::new(AuthGate::new(config.auth.clone(), accounts, &secret));
    auth_gate
        .elevate_configured_admins()
        .await
        .context("Failed to elevate configured admins")?;
    info!(
        admins = config.auth.admin_users.len(),
        open_signup = config.auth.open_signup,
        "Auth gate initialized"
    );

    let orchestrator = Arc::new(SessionOrchestrator::new(
        config.spawner.clone(),
        config.idle.clone(),
        runtime,
        sessions,
    )?);
    orchestrator.restore().await?;

    let reaper = Arc::new(IdleReaper::new(orchestrator.clone(), config.idle.clone()));
    let reaper_tasks = reaper.spawn();

    // Create shared application state
    let state = Arc::new(AppState {
        config: config.clone(),
        auth_gate,
        orchestrator: orchestrator.clone(),
    });

    // Build the router with all routes and middleware
    let x_request_id = HeaderName::from_static("x-request-id");
    let app = create_router(state).layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::new(x_request_id))
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
    );

    // Bind to address
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!(%addr, "Listening on");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Start server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down...");

    for task in reaper_tasks {
        task.abort();
    }

    if config.stop_containers_on_shutdown {
        warn!("Stopping all running sessions...");
        orchestrator.stop_all().await;
    }

    if let Err(e) = orchestrator.flush().await {
        error!(error = %e, "Failed to write session table");
    }

    info!("Corral orchestrator stopped");
    Ok(())
}

/// Handle shutdown signals gracefully
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
