//! Data models for the Corral HTTP API
//!
//! Request and response bodies only; domain records live with the modules
//! that own them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::container::{Session, SessionState};

// ============================================================================
// Auth Models
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignupResponse {
    pub username: String,
    /// False while the account awaits administrator approval
    pub approved: bool,
    pub is_admin: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
    pub token_type: String,
    pub expires_in: u64,
}

// ============================================================================
// Session Models
// ============================================================================

/// Request to start a session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartSessionRequest {
    /// Image to run; the configured default when omitted
    #[serde(default)]
    pub image: Option<String>,
}

/// Session information returned to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: Uuid,
    pub owner: String,
    pub state: SessionState,
    pub image: String,
    pub container_id: Option<String>,
    /// Address on the session network once running
    pub internal_ip: Option<String>,
    pub volume: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub cpu_limit: f64,
    pub mem_limit_bytes: u64,
    #[serde(default)]
    pub accelerators: Vec<String>,
}

impl From<&Session> for SessionInfo {
    fn from(session: &Session) -> Self {
        let profile = &session.resource_profile;
        Self {
            session_id: session.session_id,
            owner: session.owner.clone(),
            state: session.state,
            image: session.image.clone(),
            container_id: session.container_id().map(str::to_string),
            internal_ip: session
                .network
                .as_ref()
                .and_then(|network| network.internal_ip.clone()),
            volume: session.volume.name.clone(),
            created_at: session.created_at,
            last_activity: session.last_activity,
            cpu_limit: profile.cpu_limit(),
            mem_limit_bytes: profile.mem_limit().bytes(),
            accelerators: profile.accelerators().iter().cloned().collect(),
        }
    }
}

// ============================================================================
// Health & Errors
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub active_sessions: u64,
    #[serde(default)]
    pub runtime_version: Option<String>,
}

/// Health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}
