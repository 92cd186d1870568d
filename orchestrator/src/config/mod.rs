//! Configuration module for the Corral orchestrator
//!
//! Supports configuration via:
//! - YAML/TOML config files
//! - Environment variables (with CORRAL__ prefix)
//!
//! The resulting [`AppConfig`] is built once at startup and handed to each
//! component's constructor; nothing reads configuration from ambient state.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::resources::ResourceProfile;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory holding the account and session tables
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// File holding the token signing secret (created if missing)
    #[serde(default = "default_cookie_secret_file")]
    pub cookie_secret_file: PathBuf,

    /// Stop running session containers when the orchestrator shuts down
    #[serde(default = "default_true")]
    pub stop_containers_on_shutdown: bool,

    /// Container spawning settings
    #[serde(default)]
    pub spawner: SpawnerConfig,

    /// Signup/login policy
    #[serde(default)]
    pub auth: AuthConfig,

    /// Idle reclamation settings
    #[serde(default)]
    pub idle: IdleConfig,

    /// Metrics settings
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Container runtime used to materialize sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    #[default]
    Podman,
    Docker,
}

impl RuntimeKind {
    pub fn binary_name(&self) -> &'static str {
        match self {
            RuntimeKind::Podman => "podman",
            RuntimeKind::Docker => "docker",
        }
    }
}

/// Default resource allocation for new sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDefaults {
    /// CPU cores (can be fractional)
    #[serde(default = "default_cpu_limit")]
    pub cpu_limit: f64,

    /// Memory limit, e.g. "4G" or "512M"
    #[serde(default = "default_mem_limit")]
    pub mem_limit: String,

    /// Comma separated accelerator device ids; empty for none
    #[serde(default)]
    pub gpu: String,
}

/// Container spawning configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpawnerConfig {
    /// Which container runtime to drive
    #[serde(default)]
    pub runtime: RuntimeKind,

    /// Explicit path to the runtime binary (looked up on PATH otherwise)
    #[serde(default)]
    pub runtime_binary: Option<String>,

    /// Image used when a start request does not name one
    #[serde(default = "default_image")]
    pub image: String,

    /// Images a session may be created from; empty allows only `image`
    #[serde(default)]
    pub allowed_images: Vec<String>,

    /// Command the container entrypoint runs
    #[serde(default = "default_spawn_cmd")]
    pub spawn_cmd: Vec<String>,

    /// Overlay network every session container joins
    #[serde(default = "default_network_name")]
    pub network_name: String,

    /// In-container working directory where the user volume is mounted
    #[serde(default = "default_notebook_dir")]
    pub notebook_dir: String,

    /// Prefix for container names
    #[serde(default = "default_container_prefix")]
    pub container_prefix: String,

    /// Volume name template; `{username}` is replaced by the escaped owner
    #[serde(default = "default_volume_template")]
    pub volume_name_template: String,

    /// User the container process runs as
    #[serde(default)]
    pub container_user: Option<String>,

    /// Remove containers once they are stopped
    #[serde(default = "default_true")]
    pub remove_on_stop: bool,

    /// Default resource limits
    #[serde(default)]
    pub limits: ResourceDefaults,

    /// Upper bound on waiting for a started container to become healthy
    #[serde(default = "default_health_timeout")]
    pub health_check_timeout_seconds: u64,

    /// Delay between health polls
    #[serde(default = "default_health_poll")]
    pub health_poll_interval_ms: u64,

    /// Port the in-container server listens on
    #[serde(default = "default_health_port")]
    pub health_port: u16,

    /// HTTP path probed on the container's internal address, if set
    #[serde(default)]
    pub health_path: Option<String>,

    /// Automatic retries of a failed start before the error is surfaced
    #[serde(default = "default_start_retries")]
    pub start_retries: u32,

    /// Grace period handed to the runtime when stopping a container
    #[serde(default = "default_stop_grace")]
    pub stop_grace_seconds: u64,
}

/// Authentication policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// New accounts are usable immediately instead of waiting for approval
    #[serde(default)]
    pub open_signup: bool,

    /// Consecutive failed logins that trigger a lockout
    #[serde(default = "default_failed_logins")]
    pub allowed_failed_logins: u32,

    /// How long a lockout lasts
    #[serde(default = "default_lockout")]
    pub lockout_seconds: u64,

    /// Minimum accepted password length
    #[serde(default = "default_min_password")]
    pub minimum_password_length: usize,

    /// Reject passwords found in the common-password list
    #[serde(default = "default_true")]
    pub check_common_password: bool,

    /// Lifetime of issued tokens
    #[serde(default = "default_token_expiration")]
    pub token_expiration_seconds: u64,

    /// Identities elevated to administrator at startup and on signup
    #[serde(default)]
    pub admin_users: Vec<String>,
}

/// Idle reclamation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdleConfig {
    /// Sessions without activity for this long are stopped
    #[serde(default = "default_session_idle")]
    pub session_idle_timeout_seconds: u64,

    /// How often the session scan runs
    #[serde(default = "default_scan_interval")]
    pub session_check_interval_seconds: u64,

    /// Idle timeout for compute sub-processes inside a session
    #[serde(default = "default_cull_idle")]
    pub cull_idle_timeout_seconds: u64,

    /// How often inner-activity culling runs
    #[serde(default = "default_scan_interval")]
    pub cull_interval_seconds: u64,

    /// Command executed inside each running container to cull idle
    /// sub-processes; empty leaves culling to the in-container agent alone
    #[serde(default)]
    pub cull_command: Vec<String>,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable Prometheus metrics endpoint
    #[serde(default = "default_true")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/corral")
}

fn default_cookie_secret_file() -> PathBuf {
    PathBuf::from("/var/lib/corral/cookie_secret")
}

fn default_true() -> bool {
    true
}

fn default_cpu_limit() -> f64 {
    1.0
}

fn default_mem_limit() -> String {
    "4G".to_string()
}

fn default_image() -> String {
    "quay.io/jupyter/base-notebook:latest".to_string()
}

fn default_spawn_cmd() -> Vec<String> {
    vec!["start-singleuser.sh".to_string()]
}

fn default_network_name() -> String {
    "corral".to_string()
}

fn default_notebook_dir() -> String {
    "/home/jovyan/work".to_string()
}

fn default_container_prefix() -> String {
    "corral".to_string()
}

fn default_volume_template() -> String {
    "corral-user-{username}".to_string()
}

fn default_health_timeout() -> u64 {
    60
}

fn default_health_poll() -> u64 {
    500
}

fn default_health_port() -> u16 {
    8888
}

fn default_start_retries() -> u32 {
    1
}

fn default_stop_grace() -> u64 {
    10
}

fn default_failed_logins() -> u32 {
    3
}

fn default_lockout() -> u64 {
    15 * 60
}

fn default_min_password() -> usize {
    8
}

fn default_token_expiration() -> u64 {
    3600
}

fn default_session_idle() -> u64 {
    60 * 60
}

fn default_cull_idle() -> u64 {
    30 * 60
}

fn default_scan_interval() -> u64 {
    5 * 60
}

impl Default for ResourceDefaults {
    fn default() -> Self {
        Self {
            cpu_limit: default_cpu_limit(),
            mem_limit: default_mem_limit(),
            gpu: String::new(),
        }
    }
}

impl Default for SpawnerConfig {
    fn default() -> Self {
        Self {
            runtime: RuntimeKind::default(),
            runtime_binary: None,
            image: default_image(),
            allowed_images: vec![],
            spawn_cmd: default_spawn_cmd(),
            network_name: default_network_name(),
            notebook_dir: default_notebook_dir(),
            container_prefix: default_container_prefix(),
            volume_name_template: default_volume_template(),
            container_user: None,
            remove_on_stop: true,
            limits: ResourceDefaults::default(),
            health_check_timeout_seconds: default_health_timeout(),
            health_poll_interval_ms: default_health_poll(),
            health_port: default_health_port(),
            health_path: None,
            start_retries: default_start_retries(),
            stop_grace_seconds: default_stop_grace(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            open_signup: false,
            allowed_failed_logins: default_failed_logins(),
            lockout_seconds: default_lockout(),
            minimum_password_length: default_min_password(),
            check_common_password: true,
            token_expiration_seconds: default_token_expiration(),
            admin_users: vec![],
        }
    }
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            session_idle_timeout_seconds: default_session_idle(),
            session_check_interval_seconds: default_scan_interval(),
            cull_idle_timeout_seconds: default_cull_idle(),
            cull_interval_seconds: default_scan_interval(),
            cull_command: vec![],
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            data_dir: default_data_dir(),
            cookie_secret_file: default_cookie_secret_file(),
            stop_containers_on_shutdown: true,
            spawner: SpawnerConfig::default(),
            auth: AuthConfig::default(),
            idle: IdleConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl SpawnerConfig {
    /// Whether a session may be created from `image`
    pub fn is_image_allowed(&self, image: &str) -> bool {
        if self.allowed_images.is_empty() {
            image == self.image
        } else {
            self.allowed_images.iter().any(|allowed| allowed == image)
        }
    }

    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_secs(self.health_check_timeout_seconds)
    }

    pub fn health_poll_interval(&self) -> Duration {
        Duration::from_millis(self.health_poll_interval_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_seconds)
    }

    /// Default resource profile for new sessions
    pub fn default_profile(&self) -> Result<ResourceProfile> {
        ResourceProfile::from_defaults(&self.limits).context("Invalid default resource limits")
    }
}

impl AuthConfig {
    pub fn lockout_duration(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.lockout_seconds as i64)
    }

    pub fn is_admin(&self, identity: &str) -> bool {
        self.admin_users.iter().any(|admin| admin == identity)
    }
}

impl IdleConfig {
    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_timeout_seconds)
    }

    pub fn session_check_interval(&self) -> Duration {
        Duration::from_secs(self.session_check_interval_seconds)
    }

    pub fn cull_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.cull_idle_timeout_seconds)
    }

    pub fn cull_interval(&self) -> Duration {
        Duration::from_secs(self.cull_interval_seconds)
    }
}

impl AppConfig {
    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self> {
        // Try to load .env file if present
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config/corral").required(false))
            .add_source(config::File::with_name("/etc/corral/config").required(false))
            // CORRAL__SPAWNER__NETWORK_NAME=..., CORRAL__AUTH__OPEN_SIGNUP=true
            .add_source(
                config::Environment::with_prefix("CORRAL")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(";")
                    .with_list_parse_key("spawner.allowed_images")
                    .with_list_parse_key("spawner.spawn_cmd")
                    .with_list_parse_key("auth.admin_users")
                    .with_list_parse_key("idle.cull_command")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        app_config.validate()?;

        Ok(app_config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("Port cannot be 0");
        }

        self.spawner.default_profile()?;

        if !self.spawner.is_image_allowed(&self.spawner.image) {
            anyhow::bail!(
                "Default image {} is not in allowed_images",
                self.spawner.image
            );
        }

        if self.spawner.network_name.trim().is_empty() {
            anyhow::bail!("Network name cannot be empty");
        }

        if !self.spawner.notebook_dir.starts_with('/') {
            anyhow::bail!("Notebook directory must be an absolute path");
        }

        if !self.spawner.volume_name_template.contains("{username}") {
            anyhow::bail!("Volume name template must contain {{username}}");
        }

        if self.spawner.health_check_timeout_seconds == 0 {
            anyhow::bail!("Health check timeout cannot be 0");
        }

        if self.auth.allowed_failed_logins == 0 {
            anyhow::bail!("allowed_failed_logins must be at least 1");
        }

        if self.auth.minimum_password_length == 0 {
            anyhow::bail!("minimum_password_length must be at least 1");
        }

        if self.idle.session_check_interval_seconds == 0 || self.idle.cull_interval_seconds == 0 {
            anyhow::bail!("Idle scan intervals cannot be 0");
        }

        if self.idle.cull_idle_timeout_seconds >= self.idle.session_idle_timeout_seconds {
            anyhow::bail!("Inner cull timeout must be shorter than the session idle timeout");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.auth.allowed_failed_logins, 3);
        assert_eq!(config.auth.minimum_password_length, 8);
        assert_eq!(config.auth.lockout_seconds, 900);
        assert_eq!(config.spawner.start_retries, 1);
        assert_eq!(config.spawner.health_check_timeout_seconds, 60);
        assert!(!config.auth.open_signup);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let config = AppConfig {
            port: 0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.spawner.limits.cpu_limit = 0.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.idle.cull_idle_timeout_seconds = config.idle.session_idle_timeout_seconds;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_allowed_images() {
        let mut spawner = SpawnerConfig::default();
        assert!(spawner.is_image_allowed(&spawner.image.clone()));
        assert!(!spawner.is_image_allowed("evil:latest"));

        spawner.allowed_images = vec!["lab:1".to_string(), "lab:2".to_string()];
        assert!(spawner.is_image_allowed("lab:2"));
        assert!(!spawner.is_image_allowed(&spawner.image.clone()));
    }
}
