//! Container management module for the Corral orchestrator
//!
//! Handles all interactions with session containers:
//! - Per-user session lifecycle (start, stop, activity, status)
//! - The container runtime seam and its podman/docker implementation
//! - Reconciliation with the runtime after restarts

mod orchestrator;
mod runtime;
pub mod session;

use std::sync::Arc;

use anyhow::Result;
use thiserror::Error;

use crate::config::SpawnerConfig;

pub use orchestrator::SessionOrchestrator;
#[cfg(test)]
pub use runtime::MockContainerRuntime;
pub use runtime::{CliRuntime, ContainerRuntime, ContainerSpec, ContainerStatus};
pub use session::{ContainerHandle, Session, SessionHandle, SessionState};

/// Errors from session orchestration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrchestrationError {
    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("Network attach failed: {0}")]
    NetworkAttachFailed(String),

    #[error("Session did not become healthy within {seconds}s")]
    HealthCheckTimeout { seconds: u64 },

    #[error("No session for {0}")]
    NotFound(String),

    #[error("Image not allowed: {0}")]
    ImageNotAllowed(String),

    #[error("Stop failed: {0}")]
    StopFailed(String),
}

impl OrchestrationError {
    /// Short label used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            OrchestrationError::ResourceUnavailable(_) => "resource_unavailable",
            OrchestrationError::NetworkAttachFailed(_) => "network_attach_failed",
            OrchestrationError::HealthCheckTimeout { .. } => "health_check_timeout",
            OrchestrationError::NotFound(_) => "not_found",
            OrchestrationError::ImageNotAllowed(_) => "image_not_allowed",
            OrchestrationError::StopFailed(_) => "stop_failed",
        }
    }
}

/// Connect to the runtime selected in configuration
pub async fn connect_runtime(config: &SpawnerConfig) -> Result<Arc<dyn ContainerRuntime>> {
    let runtime = CliRuntime::new(config.runtime, config.runtime_binary.clone()).await?;
    Ok(Arc::new(runtime))
}
