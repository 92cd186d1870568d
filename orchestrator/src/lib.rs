//! Corral orchestrator library
//!
//! Gives every signed-up user their own containerized compute session: an
//! isolated container with resource limits, a persistent per-user volume and
//! an address on a shared internal network. Idle sessions are reclaimed in
//! the background.

use std::sync::Arc;

pub mod api;
pub mod auth;
pub mod config;
pub mod container;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod network;
pub mod reaper;
pub mod resources;
pub mod store;

/// Application state shared across all handlers
pub struct AppState {
    pub config: config::AppConfig,
    pub auth_gate: Arc<auth::AuthGate>,
    pub orchestrator: Arc<container::SessionOrchestrator>,
}
