//! Container runtime client
//!
//! The orchestrator only talks to containers through [`ContainerRuntime`].
//! [`CliRuntime`] drives the podman or docker command line; which one is
//! chosen at startup from [`RuntimeKind`].

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Output;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::config::RuntimeKind;
use crate::network::VolumeBinding;

#[cfg(test)]
use mockall::automock;

/// Everything the runtime needs to create a session container
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub cmd: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    pub network: String,
    pub volume: VolumeBinding,
    pub user: Option<String>,
    pub cpu_limit: f64,
    pub mem_bytes: u64,
    pub devices: Vec<String>,
}

/// Observed state of a container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerStatus {
    pub exists: bool,
    pub running: bool,
    /// Address on the requested network, once assigned
    pub ip: Option<String>,
}

impl ContainerStatus {
    pub fn missing() -> Self {
        Self::default()
    }
}

/// Operations the orchestrator needs from a container runtime.
///
/// Implementations may block for a long time; callers never hold a
/// per-owner lock across these calls.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Runtime version string, if the runtime answers
    async fn version(&self) -> Option<String>;

    /// Whether accelerator devices can be passed into containers
    async fn supports_device_passthrough(&self) -> bool;

    async fn network_exists(&self, network: &str) -> Result<bool>;

    /// Create the named volume unless it already exists
    async fn ensure_volume(&self, name: &str) -> Result<()>;

    /// Create and start a container, returning its id
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String>;

    async fn inspect(&self, id: &str, network: &str) -> Result<ContainerStatus>;

    async fn stop_container(&self, id: &str, grace: Duration) -> Result<()>;

    async fn remove_container(&self, id: &str) -> Result<()>;

    async fn exec(&self, id: &str, cmd: &[String]) -> Result<()>;
}

/// Runtime driven through the podman/docker CLI
pub struct CliRuntime {
    kind: RuntimeKind,
    binary: String,
}

impl CliRuntime {
    /// Locate the runtime binary and verify it responds
    pub async fn new(kind: RuntimeKind, binary: Option<String>) -> Result<Self> {
        let binary = match binary {
            Some(binary) => binary,
            None => which::which(kind.binary_name())
                .map(|p| p.to_string_lossy().to_string())
                .with_context(|| format!("{} not found on PATH", kind.binary_name()))?,
        };

        let runtime = Self { kind, binary };
        let version = runtime
            .version()
            .await
            .with_context(|| format!("{} not available or not working", runtime.binary))?;
        info!(runtime = ?kind, version = %version, "Container runtime initialized");

        Ok(runtime)
    }

    async fn run<I, S>(&self, args: I) -> Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .with_context(|| format!("Failed to run {}", self.binary))
    }

    /// Run a command that must succeed, returning trimmed stdout
    async fn run_checked(&self, args: &[String], what: &str) -> Result<String> {
        let output = self.run(args).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("{} failed: {}", what, stderr.trim());
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn run_args(&self, spec: &ContainerSpec) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--detach".to_string(),
            "--name".to_string(),
            spec.name.clone(),
            // Internal address only; nothing is published on the host
            "--network".to_string(),
            spec.network.clone(),
            "--cpus".to_string(),
            format!("{}", spec.cpu_limit),
            "--memory".to_string(),
            format!("{}b", spec.mem_bytes),
            "--volume".to_string(),
            format!("{}:{}", spec.volume.name, spec.volume.mount_path),
            "--workdir".to_string(),
            spec.volume.mount_path.clone(),
        ];

        if let Some(ref user) = spec.user {
            args.push("--user".to_string());
            args.push(user.clone());
        }

        for (key, value) in &spec.env {
            args.push("--env".to_string());
            args.push(format!("{}={}", key, value));
        }

        for (key, value) in &spec.labels {
            args.push("--label".to_string());
            args.push(format!("{}={}", key, value));
        }

        if !spec.devices.is_empty() {
            match self.kind {
                RuntimeKind::Podman => {
                    for device in &spec.devices {
                        args.push("--device".to_string());
                        args.push(format!("nvidia.com/gpu={}", device));
                    }
                }
                RuntimeKind::Docker => {
                    args.push("--gpus".to_string());
                    args.push(format!("\"device={}\"", spec.devices.join(",")));
                }
            }
        }

        args.push(spec.image.clone());
        args.extend(spec.cmd.iter().cloned());
        args
    }
}

#[async_trait]
impl ContainerRuntime for CliRuntime {
    async fn version(&self) -> Option<String> {
        let output = self.run(["--version"]).await.ok()?;

        if output.status.success() {
            Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            None
        }
    }

    async fn supports_device_passthrough(&self) -> bool {
        match self.kind {
            RuntimeKind::Docker => match self.run(["info", "--format", "{{json .Runtimes}}"]).await {
                Ok(output) if output.status.success() => {
                    String::from_utf8_lossy(&output.stdout).contains("nvidia")
                }
                _ => false,
            },
            // podman passes devices through CDI specs
            RuntimeKind::Podman => ["/etc/cdi", "/var/run/cdi"].iter().any(|dir| {
                ["nvidia.yaml", "nvidia.json"]
                    .iter()
                    .any(|file| Path::new(dir).join(file).exists())
            }),
        }
    }

    async fn network_exists(&self, network: &str) -> Result<bool> {
        let output = self.run(["network", "inspect", network]).await?;
        Ok(output.status.success())
    }

    async fn ensure_volume(&self, name: &str) -> Result<()> {
        let output = self.run(["volume", "inspect", name]).await?;
        if output.status.success() {
            debug!(volume = %name, "Volume already exists");
            return Ok(());
        }

        let args = [
            "volume".to_string(),
            "create".to_string(),
            "--label".to_string(),
            "managed-by=corral".to_string(),
            name.to_string(),
        ];
        self.run_checked(&args, "volume create").await?;
        info!(volume = %name, "Volume created");
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        // A stopped container kept from an earlier session would clash on name
        let cleanup = self.run(["rm", "-f", spec.name.as_str()]).await;
        if let Some(reason) = cleanup_failure(&cleanup) {
            debug!(name = %spec.name, reason = %reason, "Pre-create cleanup removed nothing");
        }

        let args = self.run_args(spec);
        debug!(args = ?args, "Starting container");

        let output = self.run(&args).await.context("Failed to start container")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!(stderr = %stderr, "Container start failed");
            anyhow::bail!("Failed to start container: {}", stderr.trim());
        }

        let container_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        info!(container_id = %container_id, name = %spec.name, "Container started");

        Ok(container_id)
    }

    async fn inspect(&self, id: &str, network: &str) -> Result<ContainerStatus> {
        let output = self.run(["inspect", "--type", "container", id]).await?;
        if !output.status.success() {
            return Ok(ContainerStatus::missing());
        }

        let json: serde_json::Value = serde_json::from_slice(&output.stdout)
            .context("Failed to parse container inspect output")?;
        Ok(parse_inspect(&json, network))
    }

    async fn stop_container(&self, id: &str, grace: Duration) -> Result<()> {
        let args = [
            "stop".to_string(),
            "--time".to_string(),
            grace.as_secs().to_string(),
            id.to_string(),
        ];
        self.run_checked(&args, "container stop").await?;
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> Result<()> {
        let output = self.run(["rm", "-f", id]).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stderr.to_lowercase().contains("no such container") {
                anyhow::bail!("container remove failed: {}", stderr.trim());
            }
        }
        Ok(())
    }

    async fn exec(&self, id: &str, cmd: &[String]) -> Result<()> {
        let mut args = vec!["exec".to_string(), id.to_string()];
        args.extend(cmd.iter().cloned());
        self.run_checked(&args, "container exec").await?;
        Ok(())
    }
}

/// Extract running state and network address from `inspect` JSON
fn parse_inspect(json: &serde_json::Value, network: &str) -> ContainerStatus {
    let container = &json[0];
    if container.is_null() {
        return ContainerStatus::missing();
    }

    let running = container["State"]["Running"].as_bool().unwrap_or(false);
    let ip = container["NetworkSettings"]["Networks"][network]["IPAddress"]
        .as_str()
        .filter(|ip| !ip.is_empty())
        .map(str::to_string);

    ContainerStatus {
        exists: true,
        running,
        ip,
    }
}

/// Why a `rm -f` did not succeed, if it did not
fn cleanup_failure(result: &Result<Output>) -> Option<String> {
    match result {
        Ok(output) if output.status.success() => None,
        Ok(output) => Some(String::from_utf8_lossy(&output.stderr).trim().to_string()),
        Err(e) => Some(format!("{:#}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn spec() -> ContainerSpec {
        ContainerSpec {
            name: "corral-alice".to_string(),
            image: "lab:latest".to_string(),
            cmd: vec!["start-singleuser.sh".to_string()],
            env: BTreeMap::from([("CORRAL_USER".to_string(), "alice".to_string())]),
            labels: BTreeMap::new(),
            network: "corral".to_string(),
            volume: VolumeBinding {
                name: "corral-user-alice".to_string(),
                mount_path: "/home/jovyan/work".to_string(),
            },
            user: None,
            cpu_limit: 1.5,
            mem_bytes: 1 << 30,
            devices: vec!["0".to_string(), "1".to_string()],
        }
    }

    #[test]
    fn test_run_args_podman() {
        let runtime = CliRuntime {
            kind: RuntimeKind::Podman,
            binary: "podman".to_string(),
        };
        let args = runtime.run_args(&spec());

        assert_eq!(&args[..4], &["run", "--detach", "--name", "corral-alice"]);
        assert!(args.windows(2).any(|w| w == ["--network", "corral"]));
        assert!(args.windows(2).any(|w| w == ["--cpus", "1.5"]));
        assert!(args.windows(2).any(|w| w == ["--memory", "1073741824b"]));
        assert!(args
            .windows(2)
            .any(|w| w == ["--volume", "corral-user-alice:/home/jovyan/work"]));
        assert!(args.windows(2).any(|w| w == ["--device", "nvidia.com/gpu=1"]));
        assert!(!args.iter().any(|a| a == "--publish" || a == "-p"));
        assert_eq!(args[args.len() - 2..], ["lab:latest", "start-singleuser.sh"]);
    }

    #[test]
    fn test_run_args_docker_gpus() {
        let runtime = CliRuntime {
            kind: RuntimeKind::Docker,
            binary: "docker".to_string(),
        };
        let args = runtime.run_args(&spec());
        assert!(args.windows(2).any(|w| w == ["--gpus", "\"device=0,1\""]));
    }

    #[test]
    fn test_parse_inspect() {
        let json = json!([{
            "State": { "Running": true, "Status": "running" },
            "NetworkSettings": { "Networks": { "corral": { "IPAddress": "10.89.0.7" } } }
        }]);
        let status = parse_inspect(&json, "corral");
        assert_eq!(
            status,
            ContainerStatus {
                exists: true,
                running: true,
                ip: Some("10.89.0.7".to_string()),
            }
        );

        // address on another network is not ours
        assert_eq!(parse_inspect(&json, "other").ip, None);
        assert_eq!(parse_inspect(&json!([]), "corral"), ContainerStatus::missing());
    }

    #[cfg(unix)]
    #[test]
    fn test_cleanup_failure() {
        use std::os::unix::process::ExitStatusExt;
        use std::process::ExitStatus;

        let ok = Ok(Output {
            status: ExitStatus::from_raw(0),
            stdout: Vec::new(),
            stderr: Vec::new(),
        });
        assert_eq!(cleanup_failure(&ok), None);

        let missing = Ok(Output {
            status: ExitStatus::from_raw(1 << 8),
            stdout: Vec::new(),
            stderr: b"Error: no such container corral-alice\n".to_vec(),
        });
        assert_eq!(
            cleanup_failure(&missing).as_deref(),
            Some("Error: no such container corral-alice")
        );

        let spawn_failed: Result<Output> = Err(anyhow::anyhow!("podman not found"));
        assert_eq!(cleanup_failure(&spawn_failed).as_deref(), Some("podman not found"));
    }
}
