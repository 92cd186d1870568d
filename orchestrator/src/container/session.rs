//! Session records for per-user containers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::network::{NetworkAttachment, VolumeBinding};
use crate::resources::ResourceProfile;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Absent,
    Requested,
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl SessionState {
    /// Terminal for this session instance; a later start makes a new one
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Absent | SessionState::Stopped)
    }

    /// States in which a container may exist
    pub fn holds_container(&self) -> bool {
        matches!(
            self,
            SessionState::Starting | SessionState::Running | SessionState::Stopping
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Absent => "absent",
            SessionState::Requested => "requested",
            SessionState::Starting => "starting",
            SessionState::Running => "running",
            SessionState::Stopping => "stopping",
            SessionState::Stopped => "stopped",
        }
    }
}

/// A container as known to the runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerHandle {
    pub id: String,
    pub name: String,
}

/// Lifecycle record for one user's compute environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: Uuid,

    pub owner: String,

    /// Set only while the state holds a container
    pub container: Option<ContainerHandle>,

    pub state: SessionState,

    pub image: String,

    pub created_at: DateTime<Utc>,

    pub last_activity: DateTime<Utc>,

    pub resource_profile: ResourceProfile,

    pub volume: VolumeBinding,

    #[serde(default)]
    pub network: Option<NetworkAttachment>,
}

impl Session {
    pub fn new(
        owner: String,
        image: String,
        resource_profile: ResourceProfile,
        volume: VolumeBinding,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4(),
            owner,
            container: None,
            state: SessionState::Absent,
            image,
            created_at: now,
            last_activity: now,
            resource_profile,
            volume,
            network: None,
        }
    }

    /// Move to `state`, dropping the container handle when leaving the
    /// container-holding states
    pub fn transition(&mut self, state: SessionState) {
        self.state = state;
        if !state.holds_container() {
            self.container = None;
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    pub fn container_id(&self) -> Option<&str> {
        self.container.as_ref().map(|c| c.id.as_str())
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            session_id: self.session_id,
            owner: self.owner.clone(),
            state: self.state,
            container_id: self.container.as_ref().map(|c| c.id.clone()),
            internal_ip: self.network.as_ref().and_then(|n| n.internal_ip.clone()),
        }
    }
}

/// What a `start` caller gets back: a reference to the owner's session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionHandle {
    pub session_id: Uuid,
    pub owner: String,
    pub state: SessionState,
    pub container_id: Option<String>,
    pub internal_ip: Option<String>,
}
