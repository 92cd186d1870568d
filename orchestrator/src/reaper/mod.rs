//! Idle session reclamation
//!
//! Two independent periodic scans:
//! - the session scan stops and removes sessions idle past the session
//!   timeout, and settles sessions whose containers exited on their own
//! - the inner scan runs the configured cull command inside every running
//!   container, leaving the container itself up
//!
//! A failure for one session is logged and the scan moves on.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::IdleConfig;
use crate::container::{SessionOrchestrator, SessionState};

/// Outcome of one session scan
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanReport {
    pub reaped: usize,
    pub reclaimed: usize,
    pub errors: usize,
}

pub struct IdleReaper {
    orchestrator: Arc<SessionOrchestrator>,
    config: IdleConfig,
}

impl IdleReaper {
    pub fn new(orchestrator: Arc<SessionOrchestrator>, config: IdleConfig) -> Self {
        Self {
            orchestrator,
            config,
        }
    }

    /// Start both scans as background tasks
    pub fn spawn(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        info!(
            session_interval = self.config.session_check_interval_seconds,
            session_timeout = self.config.session_idle_timeout_seconds,
            cull_interval = self.config.cull_interval_seconds,
            cull_timeout = self.config.cull_idle_timeout_seconds,
            "Starting idle reaper"
        );

        let sessions = {
            let reaper = self.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(reaper.config.session_check_interval());
                // the first tick completes immediately
                interval.tick().await;
                loop {
                    interval.tick().await;
                    let report = reaper.scan_sessions_at(Utc::now()).await;
                    if report != ScanReport::default() {
                        info!(
                            reaped = report.reaped,
                            reclaimed = report.reclaimed,
                            errors = report.errors,
                            "Session scan finished"
                        );
                    }
                }
            })
        };

        let inner = tokio::spawn(async move {
            if self.config.cull_command.is_empty() {
                debug!("No cull command configured; inner culling left to containers");
                return;
            }
            let mut interval = tokio::time::interval(self.config.cull_interval());
            interval.tick().await;
            loop {
                interval.tick().await;
                self.scan_inner().await;
            }
        });

        vec![sessions, inner]
    }

    /// Reap every session idle past the session timeout at `now`
    pub async fn scan_sessions_at(&self, now: DateTime<Utc>) -> ScanReport {
        let timeout = self.config.session_idle_timeout();
        let mut report = ScanReport::default();

        for session in self.orchestrator.list().await {
            if session.state != SessionState::Running {
                continue;
            }
            let owner = session.owner.as_str();

            match self.orchestrator.reap_if_idle(owner, timeout, now).await {
                Ok(true) => {
                    report.reaped += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(owner = %owner, error = %e, "Failed to reap idle session");
                    report.errors += 1;
                    continue;
                }
            }

            match self.orchestrator.reconcile(owner).await {
                Ok(true) => report.reclaimed += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(owner = %owner, error = %e, "Failed to reconcile session");
                    report.errors += 1;
                }
            }
        }

        report
    }

    /// Run the cull command in every running session. Returns how many
    /// containers it ran in.
    pub async fn scan_inner(&self) -> usize {
        let cmd = &self.config.cull_command;
        if cmd.is_empty() {
            return 0;
        }

        let mut culled = 0;
        for session in self.orchestrator.list().await {
            if session.state != SessionState::Running {
                continue;
            }
            match self.orchestrator.exec_in_session(&session.owner, cmd).await {
                Ok(()) => culled += 1,
                Err(e) => warn!(owner = %session.owner, error = %e, "Inner cull failed"),
            }
        }
        culled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpawnerConfig;
    use crate::container::{ContainerStatus, MockContainerRuntime};
    use crate::store::SessionTable;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn running_runtime() -> MockContainerRuntime {
        let mut runtime = MockContainerRuntime::new();
        runtime.expect_network_exists().returning(|_| Ok(true));
        runtime.expect_ensure_volume().returning(|_| Ok(()));
        runtime
            .expect_create_container()
            .returning(|spec| Ok(format!("id-{}", spec.name)));
        runtime.expect_inspect().returning(|_, _| {
            Ok(ContainerStatus {
                exists: true,
                running: true,
                ip: Some("10.0.0.2".to_string()),
            })
        });
        runtime
    }

    async fn reaper(
        runtime: MockContainerRuntime,
        idle: IdleConfig,
    ) -> (Arc<SessionOrchestrator>, IdleReaper, TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let table = Arc::new(SessionTable::open(temp_dir.path(), "sessions.json").await.unwrap());
        let spawner = SpawnerConfig {
            health_check_timeout_seconds: 1,
            health_poll_interval_ms: 10,
            ..SpawnerConfig::default()
        };
        let orchestrator = Arc::new(
            SessionOrchestrator::new(spawner, idle.clone(), Arc::new(runtime), table).unwrap(),
        );
        let reaper = IdleReaper::new(orchestrator.clone(), idle);
        (orchestrator, reaper, temp_dir)
    }

    #[tokio::test]
    async fn test_scan_reaps_only_idle_sessions_once() {
        let mut runtime = running_runtime();
        runtime
            .expect_stop_container()
            .times(2)
            .returning(|_, _| Ok(()));
        runtime
            .expect_remove_container()
            .times(2)
            .returning(|_| Ok(()));

        let (orch, reaper, _dir) = reaper(runtime, IdleConfig::default()).await;
        orch.start("alice", None).await.unwrap();
        orch.start("bob", None).await.unwrap();

        let now = Utc::now();
        assert_eq!(reaper.scan_sessions_at(now).await, ScanReport::default());

        let later = now + chrono::Duration::seconds(3700);
        let report = reaper.scan_sessions_at(later).await;
        assert_eq!(report.reaped, 2);

        // repeated scans over stopped sessions do nothing
        assert_eq!(reaper.scan_sessions_at(later).await, ScanReport::default());
        assert_eq!(orch.status("alice").await.unwrap().state, SessionState::Stopped);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_scan_leaves_session_being_stopped_alone() {
        let mut runtime = running_runtime();
        let (release, gate) = std::sync::mpsc::channel::<()>();
        runtime
            .expect_stop_container()
            .times(1)
            .returning(move |_, _| {
                let _ = gate.recv_timeout(std::time::Duration::from_secs(5));
                Ok(())
            });
        runtime
            .expect_remove_container()
            .times(1)
            .returning(|_| Ok(()));

        let (orch, reaper, _dir) = reaper(runtime, IdleConfig::default()).await;
        orch.start("alice", None).await.unwrap();

        let stopper = {
            let orch = orch.clone();
            tokio::spawn(async move { orch.stop("alice", true).await })
        };
        while orch.status("alice").await.unwrap().state != SessionState::Stopping {
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        let later = Utc::now() + chrono::Duration::seconds(3700);
        for _ in 0..3 {
            assert_eq!(reaper.scan_sessions_at(later).await, ScanReport::default());
        }

        release.send(()).unwrap();
        stopper.await.unwrap().unwrap();
        assert_eq!(orch.status("alice").await.unwrap().state, SessionState::Stopped);
    }

    #[tokio::test]
    async fn test_scan_continues_after_failure() {
        let mut runtime = running_runtime();
        runtime.expect_stop_container().returning(|id, _| {
            if id == "id-corral-alice" {
                Err(anyhow::anyhow!("stop timed out"))
            } else {
                Ok(())
            }
        });
        runtime.expect_remove_container().returning(|_| Ok(()));

        let (orch, reaper, _dir) = reaper(runtime, IdleConfig::default()).await;
        orch.start("alice", None).await.unwrap();
        orch.start("bob", None).await.unwrap();

        let later = Utc::now() + chrono::Duration::seconds(3700);
        let report = reaper.scan_sessions_at(later).await;
        assert_eq!(report.reaped, 1);
        assert_eq!(report.errors, 1);

        assert_eq!(orch.status("alice").await.unwrap().state, SessionState::Running);
        assert_eq!(orch.status("bob").await.unwrap().state, SessionState::Stopped);
    }

    #[tokio::test]
    async fn test_inner_scan_execs_cull_command() {
        let mut runtime = running_runtime();
        runtime
            .expect_exec()
            .withf(|id, cmd| id == "id-corral-alice" && cmd == ["cull-idle", "--timeout=1800"])
            .times(1)
            .returning(|_, _| Ok(()));
        // the container keeps running
        runtime.expect_stop_container().never();

        let idle = IdleConfig {
            cull_command: vec!["cull-idle".to_string(), "--timeout=1800".to_string()],
            ..IdleConfig::default()
        };
        let (orch, reaper, _dir) = reaper(runtime, idle).await;
        orch.start("alice", None).await.unwrap();

        assert_eq!(reaper.scan_inner().await, 1);
        assert_eq!(orch.status("alice").await.unwrap().state, SessionState::Running);
    }

    #[tokio::test]
    async fn test_inner_scan_without_command_is_noop() {
        let (_orch, reaper, _dir) = reaper(MockContainerRuntime::new(), IdleConfig::default()).await;
        assert_eq!(reaper.scan_inner().await, 0);
    }
}
