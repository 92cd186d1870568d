//! Overlay network attachment and per-user volume binding
//!
//! Every session container joins one shared network and is reached by its
//! internal address; no host ports are published. Each user owns a volume
//! whose name is derived from the identity alone, so a restarted session
//! always lands on the same data.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::SpawnerConfig;
use crate::container::{ContainerRuntime, OrchestrationError};

/// Durable storage location for one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeBinding {
    pub name: String,
    pub mount_path: String,
}

/// Where a session container lives on the network and what it mounts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkAttachment {
    pub network: String,
    pub volume: VolumeBinding,
    /// Internal address, known once the container is up
    #[serde(default)]
    pub internal_ip: Option<String>,
}

/// Escape an identity into `[a-z0-9-]` so it is safe inside runtime names.
///
/// Lowercase letters and digits pass through; every other byte becomes
/// `-xx` (lowercase hex). The mapping is injective.
pub fn escape_identity(identity: &str) -> String {
    let mut escaped = String::with_capacity(identity.len());
    for byte in identity.bytes() {
        if byte.is_ascii_lowercase() || byte.is_ascii_digit() {
            escaped.push(byte as char);
        } else {
            escaped.push_str(&format!("-{:02x}", byte));
        }
    }
    escaped
}

pub struct NetworkBinder {
    runtime: Arc<dyn ContainerRuntime>,
    network_name: String,
    mount_path: String,
    volume_template: String,
}

impl NetworkBinder {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: &SpawnerConfig) -> Self {
        Self {
            runtime,
            network_name: config.network_name.clone(),
            mount_path: config.notebook_dir.clone(),
            volume_template: config.volume_name_template.clone(),
        }
    }

    pub fn network_name(&self) -> &str {
        &self.network_name
    }

    /// Volume binding for `owner`; identical on every call and every restart
    pub fn volume_for(&self, owner: &str) -> VolumeBinding {
        VolumeBinding {
            name: self
                .volume_template
                .replace("{username}", &escape_identity(owner)),
            mount_path: self.mount_path.clone(),
        }
    }

    /// Prepare the network attachment and volume for a new container.
    ///
    /// The network is a deployment prerequisite and is never created here.
    /// The volume is created only if it does not exist yet.
    pub async fn bind(&self, owner: &str) -> Result<NetworkAttachment, OrchestrationError> {
        let exists = self
            .runtime
            .network_exists(&self.network_name)
            .await
            .map_err(|e| OrchestrationError::NetworkAttachFailed(e.to_string()))?;
        if !exists {
            return Err(OrchestrationError::NetworkAttachFailed(format!(
                "network {} does not exist",
                self.network_name
            )));
        }

        let volume = self.volume_for(owner);
        self.runtime
            .ensure_volume(&volume.name)
            .await
            .map_err(|e| OrchestrationError::NetworkAttachFailed(e.to_string()))?;

        debug!(owner = %owner, volume = %volume.name, network = %self.network_name, "Network attachment prepared");

        Ok(NetworkAttachment {
            network: self.network_name.clone(),
            volume,
            internal_ip: None,
        })
    }

    /// Look up the container's address on the overlay network
    pub async fn resolve_address(
        &self,
        container_id: &str,
    ) -> Result<Option<String>, OrchestrationError> {
        let status = self
            .runtime
            .inspect(container_id, &self.network_name)
            .await
            .map_err(|e| OrchestrationError::NetworkAttachFailed(e.to_string()))?;

        if status.running && status.ip.is_none() {
            warn!(container_id = %container_id, network = %self.network_name, "Running container has no address on network");
        }

        Ok(status.ip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::MockContainerRuntime;

    fn binder(runtime: MockContainerRuntime) -> NetworkBinder {
        NetworkBinder::new(Arc::new(runtime), &SpawnerConfig::default())
    }

    #[test]
    fn test_escape_identity() {
        assert_eq!(escape_identity("alice"), "alice");
        assert_eq!(escape_identity("Bob"), "-42ob");
        assert_eq!(escape_identity("a.b@c"), "a-2eb-40c");
        assert_ne!(escape_identity("a-b"), escape_identity("a_b"));
    }

    #[test]
    fn test_volume_name_is_deterministic() {
        let first = binder(MockContainerRuntime::new()).volume_for("alice");
        // a fresh binder stands in for a process restart
        let second = binder(MockContainerRuntime::new()).volume_for("alice");

        assert_eq!(first, second);
        assert_eq!(first.name, "corral-user-alice");
        assert_eq!(first.mount_path, "/home/jovyan/work");
        assert_ne!(first.name, binder(MockContainerRuntime::new()).volume_for("bob").name);
    }

    #[tokio::test]
    async fn test_bind_ensures_volume() {
        let mut runtime = MockContainerRuntime::new();
        runtime
            .expect_network_exists()
            .withf(|network| network == "corral")
            .returning(|_| Ok(true));
        runtime
            .expect_ensure_volume()
            .withf(|name| name == "corral-user-alice")
            .times(1)
            .returning(|_| Ok(()));

        let attachment = binder(runtime).bind("alice").await.unwrap();
        assert_eq!(attachment.network, "corral");
        assert_eq!(attachment.volume.name, "corral-user-alice");
        assert_eq!(attachment.internal_ip, None);
    }

    #[tokio::test]
    async fn test_bind_fails_without_network() {
        let mut runtime = MockContainerRuntime::new();
        runtime.expect_network_exists().returning(|_| Ok(false));
        runtime.expect_ensure_volume().never();

        let err = binder(runtime).bind("alice").await.unwrap_err();
        assert!(matches!(err, OrchestrationError::NetworkAttachFailed(_)));
    }
}
