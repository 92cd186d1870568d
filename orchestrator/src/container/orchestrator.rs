//! Per-user session lifecycle
//!
//! Every owner has a slot guarded by its own mutex. The mutex is held only to
//! read or commit session state; runtime calls (create, health polling, stop,
//! remove) happen outside it, so one slow container never blocks another
//! owner.
//!
//! A start runs in its own task and publishes its outcome on a watch
//! channel. Concurrent `start` calls for the same owner subscribe to that
//! channel instead of creating a second container, and a `stop` issued while
//! the start is in flight is recorded in the slot and carried out by the
//! start task as soon as the container is up. A stop publishes its outcome
//! the same way, so a second `stop` arriving mid-stop reports the real result.
//!
//! State changes are staged in the session table under the owner lock and
//! written to disk by a background flush, so no owner lock waits on file I/O.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::{IdleConfig, SpawnerConfig};
use crate::metrics;
use crate::network::{escape_identity, NetworkAttachment, NetworkBinder};
use crate::resources::ResourceProfile;
use crate::store::SessionTable;

use super::runtime::{ContainerRuntime, ContainerSpec};
use super::session::{ContainerHandle, Session, SessionHandle, SessionState};
use super::OrchestrationError;

type StartOutcome = Result<SessionHandle, OrchestrationError>;
type StopOutcome = Result<(), OrchestrationError>;
type StopSignal = watch::Sender<Option<StopOutcome>>;

/// Per-owner state guarded by the owner's mutex
#[derive(Default)]
struct OwnerSlot {
    /// Latest session for this owner, possibly terminal
    session: Option<Session>,
    /// Outcome channel of a start in flight
    pending: Option<watch::Receiver<Option<StartOutcome>>>,
    /// Stop requested while starting; the flag is the `remove` argument
    stop_request: Option<bool>,
    /// Outcome channel of a stop in flight; set exactly while Stopping
    stopping: Option<watch::Receiver<Option<StopOutcome>>>,
}

impl OwnerSlot {
    /// Move the session to Stopping and open its outcome channel
    fn begin_stop(&mut self) -> StopSignal {
        let (tx, rx) = watch::channel(None);
        if let Some(session) = self.session.as_mut() {
            session.transition(SessionState::Stopping);
        }
        self.stopping = Some(rx);
        tx
    }
}

type Slot = Arc<Mutex<OwnerSlot>>;

/// Manages the container lifecycle of every user's session
pub struct SessionOrchestrator {
    config: SpawnerConfig,
    idle: IdleConfig,
    runtime: Arc<dyn ContainerRuntime>,
    binder: NetworkBinder,
    profile: ResourceProfile,
    table: Arc<SessionTable>,
    slots: RwLock<HashMap<String, Slot>>,
    http: reqwest::Client,
}

impl SessionOrchestrator {
    pub fn new(
        config: SpawnerConfig,
        idle: IdleConfig,
        runtime: Arc<dyn ContainerRuntime>,
        table: Arc<SessionTable>,
    ) -> anyhow::Result<Self> {
        let profile = config.default_profile()?;
        let binder = NetworkBinder::new(runtime.clone(), &config);

        Ok(Self {
            config,
            idle,
            runtime,
            binder,
            profile,
            table,
            slots: RwLock::new(HashMap::new()),
            http: reqwest::Client::new(),
        })
    }

    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    async fn slot(&self, owner: &str) -> Slot {
        if let Some(slot) = self.slots.read().await.get(owner) {
            return slot.clone();
        }
        self.slots
            .write()
            .await
            .entry(owner.to_string())
            .or_default()
            .clone()
    }

    async fn existing_slot(&self, owner: &str) -> Option<Slot> {
        self.slots.read().await.get(owner).cloned()
    }

    async fn persist(&self, session: &Session) {
        let generation = self.table.stage(&session.owner, session.clone()).await;
        let table = self.table.clone();
        let owner = session.owner.clone();
        tokio::spawn(async move {
            if let Err(e) = table.flush(generation).await {
                warn!(owner = %owner, error = %e, "Failed to persist session");
            }
        });
    }

    /// Write every staged change to disk
    pub async fn flush(&self) -> anyhow::Result<()> {
        self.table.flush(self.table.generation()).await
    }

    /// Start the owner's session, or return the one that already exists.
    ///
    /// Callers racing a start in flight wait for it and get the same handle.
    pub async fn start(
        self: &Arc<Self>,
        owner: &str,
        image: Option<String>,
    ) -> Result<SessionHandle, OrchestrationError> {
        let slot = self.slot(owner).await;

        let rx = {
            let mut guard = slot.lock().await;

            let live = guard
                .session
                .as_ref()
                .filter(|session| !session.state.is_terminal())
                .map(Session::handle);

            match (live, guard.pending.clone()) {
                (Some(_), Some(rx)) => {
                    debug!(owner = %owner, "Joining start in flight");
                    rx
                }
                (Some(handle), None) => return Ok(handle),
                (None, _) => {
                    let image = image.unwrap_or_else(|| self.config.image.clone());
                    if !self.config.is_image_allowed(&image) {
                        return Err(OrchestrationError::ImageNotAllowed(image));
                    }

                    let mut session = Session::new(
                        owner.to_string(),
                        image,
                        self.profile.clone(),
                        self.binder.volume_for(owner),
                    );
                    session.transition(SessionState::Requested);
                    self.persist(&session).await;

                    let (tx, rx) = watch::channel(None);
                    guard.session = Some(session);
                    guard.pending = Some(rx.clone());
                    guard.stop_request = None;

                    info!(owner = %owner, "Session requested");

                    let this = self.clone();
                    let owner = owner.to_string();
                    let task_slot = slot.clone();
                    tokio::spawn(async move {
                        let outcome = this.run_start(&owner, &task_slot).await;
                        let _ = tx.send(Some(outcome));
                    });

                    rx
                }
            }
        };

        wait_for_outcome(rx).await
    }

    /// Drive a requested session to Running (or Stopped on failure)
    async fn run_start(&self, owner: &str, slot: &Slot) -> StartOutcome {
        let session_id = {
            let mut guard = slot.lock().await;
            let Some(session) = guard.session.as_mut() else {
                return Err(OrchestrationError::NotFound(owner.to_string()));
            };
            session.transition(SessionState::Starting);
            let snapshot = session.clone();
            self.persist(&snapshot).await;
            snapshot.session_id
        };

        let attempts = 1 + self.config.start_retries;
        let mut result = Ok(());
        for attempt in 1..=attempts {
            result = self.spawn_once(owner, slot).await;
            match &result {
                Ok(()) => break,
                Err(e) => {
                    warn!(owner = %owner, attempt, attempts, error = %e, "Session start attempt failed");
                    metrics::record_start_failure(e.kind());
                    if slot.lock().await.stop_request.is_some() {
                        break;
                    }
                }
            }
        }

        let mut guard = slot.lock().await;
        guard.pending = None;
        let stop_request = guard.stop_request.take();
        let Some(session) = guard
            .session
            .as_mut()
            .filter(|session| session.session_id == session_id)
        else {
            return Err(OrchestrationError::NotFound(owner.to_string()));
        };

        match result {
            Ok(()) => match (stop_request, session.container.clone()) {
                (Some(remove), Some(container)) => {
                    info!(owner = %owner, "Stopping session requested to stop while starting");
                    let done = guard.begin_stop();
                    if let Some(snapshot) = guard.session.clone() {
                        self.persist(&snapshot).await;
                    }
                    drop(guard);

                    let _ = self
                        .finish_stop(slot, session_id, container, remove, done)
                        .await;
                    let guard = slot.lock().await;
                    guard
                        .session
                        .as_ref()
                        .map(Session::handle)
                        .ok_or_else(|| OrchestrationError::NotFound(owner.to_string()))
                }
                _ => {
                    session.transition(SessionState::Running);
                    session.touch();
                    let snapshot = session.clone();
                    self.persist(&snapshot).await;
                    metrics::record_session_started(owner);
                    info!(
                        owner = %owner,
                        container = ?snapshot.container_id(),
                        "Session running"
                    );
                    Ok(snapshot.handle())
                }
            },
            Err(e) => {
                session.transition(SessionState::Stopped);
                let snapshot = session.clone();
                self.persist(&snapshot).await;
                error!(owner = %owner, error = %e, "Session failed to start");
                Err(e)
            }
        }
    }

    /// One full start sequence: profile, network, create, health check
    async fn spawn_once(&self, owner: &str, slot: &Slot) -> Result<(), OrchestrationError> {
        let session = slot
            .lock()
            .await
            .session
            .clone()
            .ok_or_else(|| OrchestrationError::NotFound(owner.to_string()))?;

        session.resource_profile.attach(self.runtime.as_ref()).await?;
        let attachment = self.binder.bind(owner).await?;

        let spec = self.container_spec(&session, &attachment);
        let container_id = self
            .runtime
            .create_container(&spec)
            .await
            .map_err(|e| OrchestrationError::ResourceUnavailable(e.to_string()))?;

        {
            let mut guard = slot.lock().await;
            if let Some(session) = guard.session.as_mut() {
                session.container = Some(ContainerHandle {
                    id: container_id.clone(),
                    name: spec.name.clone(),
                });
                session.network = Some(attachment);
                let snapshot = session.clone();
                self.persist(&snapshot).await;
            }
        }

        let timeout = self.config.health_check_timeout();
        let health = match tokio::time::timeout(timeout, self.wait_healthy(&container_id)).await {
            Ok(result) => result,
            Err(_) => Err(OrchestrationError::HealthCheckTimeout {
                seconds: timeout.as_secs(),
            }),
        };

        let mut guard = slot.lock().await;
        let Some(session) = guard.session.as_mut() else {
            return Err(OrchestrationError::NotFound(owner.to_string()));
        };

        match health {
            Ok(ip) => {
                if let Some(network) = session.network.as_mut() {
                    network.internal_ip = ip;
                }
                Ok(())
            }
            Err(e) => {
                session.container = None;
                drop(guard);
                self.discard(&container_id).await;
                Err(e)
            }
        }
    }

    fn container_spec(&self, session: &Session, attachment: &NetworkAttachment) -> ContainerSpec {
        let profile = &session.resource_profile;
        let devices: Vec<String> = profile.accelerators().iter().cloned().collect();

        let mut env = BTreeMap::from([
            ("CORRAL_USER".to_string(), session.owner.clone()),
            ("CORRAL_SESSION_ID".to_string(), session.session_id.to_string()),
            (
                "CORRAL_CULL_IDLE_TIMEOUT".to_string(),
                self.idle.cull_idle_timeout_seconds.to_string(),
            ),
            (
                "CORRAL_CULL_INTERVAL".to_string(),
                self.idle.cull_interval_seconds.to_string(),
            ),
            (
                "CORRAL_SHUTDOWN_NO_ACTIVITY_TIMEOUT".to_string(),
                self.idle.session_idle_timeout_seconds.to_string(),
            ),
        ]);
        if !devices.is_empty() {
            env.insert("NVIDIA_VISIBLE_DEVICES".to_string(), devices.join(","));
        }

        let labels = BTreeMap::from([
            ("corral.owner".to_string(), session.owner.clone()),
            ("corral.session".to_string(), session.session_id.to_string()),
        ]);

        ContainerSpec {
            name: format!(
                "{}-{}",
                self.config.container_prefix,
                escape_identity(&session.owner)
            ),
            image: session.image.clone(),
            cmd: self.config.spawn_cmd.clone(),
            env,
            labels,
            network: attachment.network.clone(),
            volume: attachment.volume.clone(),
            user: self.config.container_user.clone(),
            cpu_limit: profile.cpu_limit(),
            mem_bytes: profile.mem_limit().bytes(),
            devices,
        }
    }

    /// Poll until the container runs with an address on the network and,
    /// when a health path is configured, answers HTTP
    async fn wait_healthy(&self, container_id: &str) -> Result<Option<String>, OrchestrationError> {
        let poll = self.config.health_poll_interval();

        loop {
            match self.runtime.inspect(container_id, self.binder.network_name()).await {
                Ok(status) if !status.exists => {
                    return Err(OrchestrationError::ResourceUnavailable(
                        "container disappeared during startup".to_string(),
                    ));
                }
                Ok(status) if status.running => {
                    if let Some(ip) = status.ip {
                        if self.probe(&ip, poll).await {
                            return Ok(Some(ip));
                        }
                    }
                }
                Ok(_) => debug!(container_id = %container_id, "Container not running yet"),
                Err(e) => debug!(container_id = %container_id, error = %e, "Inspect failed while starting"),
            }

            tokio::time::sleep(poll).await;
        }
    }

    async fn probe(&self, ip: &str, poll: Duration) -> bool {
        let Some(ref path) = self.config.health_path else {
            return true;
        };

        let url = format!("http://{}:{}{}", ip, self.config.health_port, path);
        match self
            .http
            .get(&url)
            .timeout(poll.max(Duration::from_secs(1)))
            .send()
            .await
        {
            Ok(response) => response.status().is_success() || response.status().is_redirection(),
            Err(e) => {
                debug!(url = %url, error = %e, "Health probe failed");
                false
            }
        }
    }

    /// Remove a container left behind by a failed start
    async fn discard(&self, container_id: &str) {
        if let Err(e) = self.runtime.remove_container(container_id).await {
            warn!(container_id = %container_id, error = %e, "Failed to remove container of failed start");
        }
    }

    /// Stop the owner's session.
    ///
    /// Stopping a stopped session is a no-op. A stop already in flight is
    /// joined and its outcome returned. A session still starting is stopped
    /// as soon as its start resolves; this call waits for that.
    pub async fn stop(&self, owner: &str, remove: bool) -> Result<(), OrchestrationError> {
        let slot = self
            .existing_slot(owner)
            .await
            .ok_or_else(|| OrchestrationError::NotFound(owner.to_string()))?;

        let mut guard = slot.lock().await;
        let state = guard
            .session
            .as_ref()
            .map(|session| session.state)
            .ok_or_else(|| OrchestrationError::NotFound(owner.to_string()))?;

        match state {
            SessionState::Absent | SessionState::Stopped => Ok(()),
            SessionState::Stopping => {
                let pending = guard.stopping.clone();
                drop(guard);

                debug!(owner = %owner, "Joining stop in flight");
                match pending {
                    Some(rx) => wait_for_outcome(rx).await,
                    None => Ok(()),
                }
            }
            SessionState::Requested | SessionState::Starting => {
                let remove = guard.stop_request.unwrap_or(false) || remove;
                guard.stop_request = Some(remove);
                let pending = guard.pending.clone();
                drop(guard);

                info!(owner = %owner, "Stop recorded for session still starting");
                if let Some(rx) = pending {
                    let _ = wait_for_outcome(rx).await;
                }

                let guard = slot.lock().await;
                let state = guard.session.as_ref().map(|session| session.state);
                let stopping = guard.stopping.clone();
                drop(guard);

                match (state, stopping) {
                    (Some(SessionState::Stopped), _) => Ok(()),
                    (Some(SessionState::Stopping), Some(rx)) => wait_for_outcome(rx).await,
                    _ => Err(OrchestrationError::StopFailed(
                        "session could not be stopped after its start completed".to_string(),
                    )),
                }
            }
            SessionState::Running => {
                let Some(session) = guard.session.as_ref() else {
                    return Err(OrchestrationError::NotFound(owner.to_string()));
                };
                let session_id = session.session_id;
                let container = session.container.clone();
                let done = guard.begin_stop();
                if let Some(snapshot) = guard.session.clone() {
                    self.persist(&snapshot).await;
                }
                drop(guard);

                match container {
                    Some(container) => {
                        self.finish_stop(&slot, session_id, container, remove, done)
                            .await
                    }
                    None => {
                        self.commit_stopped(&slot, session_id, done).await;
                        Ok(())
                    }
                }
            }
        }
    }

    /// Stop (and optionally remove) a container of a session already in
    /// Stopping, then commit the result
    async fn finish_stop(
        &self,
        slot: &Slot,
        session_id: uuid::Uuid,
        container: ContainerHandle,
        remove: bool,
        done: StopSignal,
    ) -> Result<(), OrchestrationError> {
        let result = async {
            self.runtime
                .stop_container(&container.id, self.config.stop_grace())
                .await?;
            if remove {
                self.runtime.remove_container(&container.id).await?;
            }
            anyhow::Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                self.commit_stopped(slot, session_id, done).await;
                Ok(())
            }
            Err(e) => {
                let outcome = Err(OrchestrationError::StopFailed(e.to_string()));
                let mut guard = slot.lock().await;
                if let Some(session) = guard
                    .session
                    .as_mut()
                    .filter(|session| session.session_id == session_id)
                {
                    // still there as far as we know; leave it for a later stop
                    session.transition(SessionState::Running);
                    let snapshot = session.clone();
                    self.persist(&snapshot).await;
                    error!(owner = %snapshot.owner, container_id = %container.id, error = %e, "Failed to stop session container");
                    guard.stopping = None;
                }
                let _ = done.send(Some(outcome.clone()));
                outcome
            }
        }
    }

    async fn commit_stopped(&self, slot: &Slot, session_id: uuid::Uuid, done: StopSignal) {
        let mut guard = slot.lock().await;
        if let Some(session) = guard
            .session
            .as_mut()
            .filter(|session| session.session_id == session_id)
        {
            session.transition(SessionState::Stopped);
            let snapshot = session.clone();
            self.persist(&snapshot).await;
            metrics::record_session_stopped(&snapshot.owner);
            info!(owner = %snapshot.owner, "Session stopped");
            guard.stopping = None;
        }
        let _ = done.send(Some(Ok(())));
    }

    /// Record user activity
    pub async fn touch(&self, owner: &str) -> Result<(), OrchestrationError> {
        let slot = self
            .existing_slot(owner)
            .await
            .ok_or_else(|| OrchestrationError::NotFound(owner.to_string()))?;
        let mut guard = slot.lock().await;
        let session = guard
            .session
            .as_mut()
            .ok_or_else(|| OrchestrationError::NotFound(owner.to_string()))?;
        // activity is not written through; transitions persist it
        session.touch();
        Ok(())
    }

    /// Snapshot of the owner's latest session
    pub async fn status(&self, owner: &str) -> Result<Session, OrchestrationError> {
        let slot = self
            .existing_slot(owner)
            .await
            .ok_or_else(|| OrchestrationError::NotFound(owner.to_string()))?;
        let guard = slot.lock().await;
        guard
            .session
            .clone()
            .ok_or_else(|| OrchestrationError::NotFound(owner.to_string()))
    }

    /// Snapshots of every known session
    pub async fn list(&self) -> Vec<Session> {
        let slots: Vec<Slot> = self.slots.read().await.values().cloned().collect();
        let mut sessions = Vec::with_capacity(slots.len());
        for slot in slots {
            if let Some(session) = slot.lock().await.session.clone() {
                sessions.push(session);
            }
        }
        sessions
    }

    pub async fn active_session_count(&self) -> u64 {
        self.list()
            .await
            .iter()
            .filter(|session| session.state == SessionState::Running)
            .count() as u64
    }

    /// Stop and remove the owner's session if it has been idle longer than
    /// `idle_timeout` at `now`. Returns whether it was reaped.
    ///
    /// The idleness check and the move to Stopping happen under the owner
    /// lock, so activity recorded concurrently is never overridden and a
    /// session already being stopped is left alone.
    pub async fn reap_if_idle(
        &self,
        owner: &str,
        idle_timeout: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool, OrchestrationError> {
        let Some(slot) = self.existing_slot(owner).await else {
            return Ok(false);
        };

        let (session_id, container, idle_for, done) = {
            let mut guard = slot.lock().await;
            let Some(session) = guard
                .session
                .as_ref()
                .filter(|session| session.state == SessionState::Running)
            else {
                return Ok(false);
            };

            let idle_for = match (now - session.last_activity).to_std() {
                Ok(idle_for) if idle_for > idle_timeout => idle_for,
                _ => return Ok(false),
            };

            let session_id = session.session_id;
            let container = session.container.clone();
            let done = guard.begin_stop();
            if let Some(snapshot) = guard.session.clone() {
                self.persist(&snapshot).await;
            }
            (session_id, container, idle_for, done)
        };

        info!(owner = %owner, idle_secs = idle_for.as_secs(), "Culling idle session");
        metrics::record_session_culled();

        match container {
            Some(container) => {
                self.finish_stop(&slot, session_id, container, true, done)
                    .await?
            }
            None => self.commit_stopped(&slot, session_id, done).await,
        }
        Ok(true)
    }

    /// Move a Running session whose container is gone or exited to Stopped.
    /// Returns whether anything was reclaimed.
    pub async fn reconcile(&self, owner: &str) -> Result<bool, OrchestrationError> {
        let Some(slot) = self.existing_slot(owner).await else {
            return Ok(false);
        };

        let (session_id, container) = {
            let guard = slot.lock().await;
            match guard.session.as_ref() {
                Some(session) if session.state == SessionState::Running => {
                    match session.container.clone() {
                        Some(container) => (session.session_id, container),
                        None => return Ok(false),
                    }
                }
                _ => return Ok(false),
            }
        };

        let status = self
            .runtime
            .inspect(&container.id, self.binder.network_name())
            .await
            .map_err(|e| OrchestrationError::ResourceUnavailable(e.to_string()))?;
        if status.running {
            return Ok(false);
        }

        let done = {
            let mut guard = slot.lock().await;
            let still_running = guard.session.as_ref().is_some_and(|session| {
                session.session_id == session_id && session.state == SessionState::Running
            });
            if !still_running {
                return Ok(false);
            }
            let done = guard.begin_stop();
            if let Some(snapshot) = guard.session.clone() {
                self.persist(&snapshot).await;
            }
            done
        };

        warn!(owner = %owner, container_id = %container.id, "Session container exited on its own");
        if status.exists {
            self.discard(&container.id).await;
        }
        self.commit_stopped(&slot, session_id, done).await;
        Ok(true)
    }

    /// Run `cmd` inside the owner's running container
    pub async fn exec_in_session(&self, owner: &str, cmd: &[String]) -> Result<(), OrchestrationError> {
        let session = self.status(owner).await?;
        let container_id = match (session.state, session.container_id()) {
            (SessionState::Running, Some(id)) => id.to_string(),
            _ => return Err(OrchestrationError::NotFound(owner.to_string())),
        };

        self.runtime
            .exec(&container_id, cmd)
            .await
            .map_err(|e| OrchestrationError::ResourceUnavailable(e.to_string()))
    }

    /// Reload the session table after a restart.
    ///
    /// Sessions whose containers are still running are adopted as Running;
    /// everything else is settled as Stopped.
    pub async fn restore(&self) -> anyhow::Result<()> {
        let mut adopted = 0usize;
        for mut session in self.table.values().await {
            let running = match session.container_id() {
                Some(id) if session.state.holds_container() => self
                    .runtime
                    .inspect(id, self.binder.network_name())
                    .await
                    .map(|status| status.running)
                    .unwrap_or(false),
                _ => false,
            };

            if running {
                // addresses can change when the runtime restarts containers
                if let Some(id) = session.container_id().map(str::to_string) {
                    match self.binder.resolve_address(&id).await {
                        Ok(ip) => {
                            if let Some(network) = session.network.as_mut() {
                                network.internal_ip = ip;
                            }
                        }
                        Err(e) => warn!(owner = %session.owner, error = %e, "Failed to resolve session address"),
                    }
                }
                session.transition(SessionState::Running);
                session.touch();
                adopted += 1;
            } else if !session.state.is_terminal() {
                if let Some(id) = session.container_id() {
                    self.discard(id).await;
                }
                session.transition(SessionState::Stopped);
            }

            self.persist(&session).await;
            let slot = self.slot(&session.owner).await;
            slot.lock().await.session = Some(session);
        }

        info!(adopted, "Session table restored");
        Ok(())
    }

    /// Stop every running session; used on shutdown
    pub async fn stop_all(&self) {
        for session in self.list().await {
            if session.state != SessionState::Running {
                continue;
            }
            if let Err(e) = self.stop(&session.owner, self.config.remove_on_stop).await {
                error!(owner = %session.owner, error = %e, "Failed to stop session on shutdown");
            }
        }
    }
}

async fn wait_for_outcome<T: Clone>(
    mut rx: watch::Receiver<Option<Result<T, OrchestrationError>>>,
) -> Result<T, OrchestrationError> {
    let outcome = match rx.wait_for(Option::is_some).await {
        Ok(outcome) => outcome.clone(),
        Err(_) => None,
    };
    outcome.unwrap_or_else(|| {
        Err(OrchestrationError::ResourceUnavailable(
            "session task ended without an outcome".to_string(),
        ))
    })
}
