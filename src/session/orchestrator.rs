//! Session Layout Engine
//!
//! Turns a host selection into a live multiplexer session:
//! Planning -> Naming -> Creating -> Populating -> Ready.
//!
//! Each pane is opened and launched through the retry executor. Host-level
//! problems (bad targets, panes that keep failing) end up in the report.
//! Only failing to create the session or one of its windows aborts the
//! build, and a session that was already created is killed first.

use chrono::Local;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

use super::backend::{manual_attach_instruction, AttachOutcome, BackendKind, PaneRef, SessionBackend};
use super::error::{MuxError, SessionError};
use super::layout::{plan_windows, SessionMode, WindowPlan};
use super::naming::{base_name, unique_session_name};
use crate::config::Config;
use crate::retry::{self, AttemptError, ConnectError};
use crate::sot::Host;
use crate::ssh::{self, ConnectionProbe, SshTarget};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutState {
    Planning,
    Naming,
    Creating,
    Populating,
    Ready,
    Failed,
}

impl fmt::Display for LayoutState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LayoutState::Planning => "planning",
            LayoutState::Naming => "naming",
            LayoutState::Creating => "creating",
            LayoutState::Populating => "populating",
            LayoutState::Ready => "ready",
            LayoutState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// What the user asked for
#[derive(Debug, Clone)]
pub struct SessionRequest {
    /// Selection, in the order panes are assigned
    pub hosts: Vec<Host>,
    pub mode: SessionMode,
    pub broadcast: bool,
    /// Hand the session to the user once it is ready
    pub attach: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PaneStatus {
    Connected,
    /// The pane exists and shows the failure
    Failed { reason: String, attempts: u32 },
    /// No pane was created for this host
    InvalidTarget { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct PaneReport {
    pub host: String,
    pub window: Option<String>,
    pub pane_id: Option<String>,
    #[serde(flatten)]
    pub status: PaneStatus,
}

/// Outcome of a session build, including partial failures
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub session_name: String,
    pub backend: BackendKind,
    pub mode: SessionMode,
    pub panes: Vec<PaneReport>,
    pub broadcast: bool,
    pub attach: Option<AttachOutcome>,
    pub warnings: Vec<String>,
}

impl SessionReport {
    fn count(&self, pred: impl Fn(&PaneStatus) -> bool) -> usize {
        self.panes.iter().filter(|p| pred(&p.status)).count()
    }

    pub fn connected(&self) -> usize {
        self.count(|s| matches!(s, PaneStatus::Connected))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, PaneStatus::Failed { .. }))
    }

    pub fn invalid(&self) -> usize {
        self.count(|s| matches!(s, PaneStatus::InvalidTarget { .. }))
    }

    pub fn is_partial(&self) -> bool {
        self.failed() + self.invalid() > 0
    }
}

/// A host that passed resolution
struct Resolved<'h> {
    host: &'h Host,
    target: SshTarget,
}

pub struct SessionEngine<'a> {
    backend: &'a dyn SessionBackend,
    probe: Option<&'a dyn ConnectionProbe>,
    config: &'a Config,
}

impl<'a> SessionEngine<'a> {
    pub fn new(backend: &'a dyn SessionBackend, config: &'a Config) -> Self {
        Self {
            backend,
            probe: None,
            config,
        }
    }

    /// Probe used when `ssh.preflight` is enabled
    pub fn with_probe(mut self, probe: &'a dyn ConnectionProbe) -> Self {
        self.probe = Some(probe);
        self
    }

    fn transition(&self, from: LayoutState, to: LayoutState) {
        debug!("Session layout: {} -> {}", from, to);
    }

    fn fail(&self, stage: LayoutState, err: MuxError) -> SessionError {
        warn!("Session layout failed while {}: {}", stage, err);
        self.transition(stage, LayoutState::Failed);
        SessionError::layout(stage, err)
    }

    pub async fn build(&self, request: &SessionRequest) -> Result<SessionReport, SessionError> {
        // Planning
        let mut invalid = Vec::new();
        let mut resolved = Vec::new();
        for host in &request.hosts {
            match ssh::resolve(host, &self.config.ssh, &self.config.ssh.proxy) {
                Ok(target) => resolved.push(Resolved { host, target }),
                Err(e) => {
                    warn!("Skipping {}: {}", host.display_name(), e);
                    invalid.push(PaneReport {
                        host: host.display_name().to_string(),
                        window: None,
                        pane_id: None,
                        status: PaneStatus::InvalidTarget {
                            reason: e.to_string(),
                        },
                    });
                }
            }
        }
        if resolved.is_empty() {
            return Err(SessionError::EmptySelection { invalid });
        }

        let version = self
            .backend
            .prepare()
            .await
            .map_err(|e| self.fail(LayoutState::Planning, e))?;
        debug!("Session backend ready: {}", version);

        let names: Vec<&str> = resolved.iter().map(|r| r.host.display_name()).collect();
        let plan = plan_windows(
            &names,
            request.mode,
            self.config.tmux.max_panes_per_window,
            &self.config.tmux.window_name,
        );

        // Naming
        self.transition(LayoutState::Planning, LayoutState::Naming);
        let base = base_name(&self.config.sshplex.session_prefix, Local::now());
        let session_name = unique_session_name(self.backend, &base)
            .await
            .map_err(|e| self.fail(LayoutState::Naming, e))?;

        // Creating
        self.transition(LayoutState::Naming, LayoutState::Creating);
        let first_pane = self
            .backend
            .create_session(&session_name, &plan[0].name)
            .await
            .map_err(|e| self.fail(LayoutState::Creating, e))?;
        info!(
            "Created session '{}' for {} hosts in {} windows",
            session_name,
            resolved.len(),
            plan.len()
        );

        let mut warnings = Vec::new();
        if let Err(e) = self.backend.bind_broadcast_toggle().await {
            warnings.push(format!("Broadcast toggle key not installed: {}", e));
        }

        // Populating
        self.transition(LayoutState::Creating, LayoutState::Populating);
        let (mut panes, window_ids) = match self
            .populate(&session_name, &plan, &resolved, first_pane)
            .await
        {
            Ok(populated) => populated,
            Err(e) => {
                if let Err(kill_err) = self.backend.kill_session(&session_name).await {
                    warn!("Failed to clean up session '{}': {}", session_name, kill_err);
                }
                return Err(self.fail(LayoutState::Populating, e));
            }
        };

        // Ready
        self.transition(LayoutState::Populating, LayoutState::Ready);
        if request.broadcast {
            for window_id in &window_ids {
                if let Err(e) = self.backend.set_synchronize(window_id, true).await {
                    warnings.push(format!("Broadcast not enabled for window {}: {}", window_id, e));
                }
            }
        }

        panes.extend(invalid);
        let mut report = SessionReport {
            session_name,
            backend: self.backend.kind(),
            mode: request.mode,
            panes,
            broadcast: request.broadcast,
            attach: None,
            warnings,
        };
        info!(
            "Session '{}' ready: {} connected, {} failed, {} invalid",
            report.session_name,
            report.connected(),
            report.failed(),
            report.invalid()
        );

        if request.attach {
            let outcome = match self.backend.attach(&report.session_name).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("Attach failed: {}", e);
                    report.warnings.push(format!("Attach failed: {}", e));
                    AttachOutcome::Manual {
                        instruction: manual_attach_instruction(&report.session_name),
                    }
                }
            };
            report.attach = Some(outcome);
        }

        Ok(report)
    }

    /// Create every window in plan order and launch each pane.
    /// Returns the pane reports and the window ids. Only a window that
    /// cannot be created is an error; pane problems end up in the reports.
    async fn populate(
        &self,
        session: &str,
        plan: &[WindowPlan],
        resolved: &[Resolved<'_>],
        first_pane: PaneRef,
    ) -> Result<(Vec<PaneReport>, Vec<String>), MuxError> {
        let mut reports = Vec::with_capacity(resolved.len());
        let mut window_ids = Vec::with_capacity(plan.len());
        let mut initial = Some(first_pane);

        for window in plan {
            let window_pane = match initial.take() {
                Some(pane) => pane,
                None => self.backend.new_window(session, &window.name).await?,
            };
            window_ids.push(window_pane.window_id.clone());

            for (slot, &index) in window.hosts.iter().enumerate() {
                let existing = (slot == 0).then(|| window_pane.clone());
                let report = self
                    .launch(&window.name, &window_pane, existing, &resolved[index])
                    .await;
                reports.push(report);
            }
        }

        Ok((reports, window_ids))
    }

    /// Open one pane and start ssh in it under the retry policy. A pane that
    /// still fails after the last attempt is kept, retitled and marked failed.
    async fn launch(
        &self,
        window: &str,
        window_pane: &PaneRef,
        existing: Option<PaneRef>,
        resolved: &Resolved<'_>,
    ) -> PaneReport {
        let name = resolved.host.display_name();
        let pane = Mutex::new(existing);

        let outcome = retry::attempt(name, &self.config.ssh.retry, |_| {
            self.try_launch(&pane, window_pane, resolved)
        })
        .await;
        let pane = pane.into_inner();

        let status = match outcome {
            Ok(()) => PaneStatus::Connected,
            Err(e) => {
                if let Some(pane) = &pane {
                    self.mark_failed(pane, name, &e).await;
                }
                PaneStatus::Failed {
                    reason: e.to_string(),
                    attempts: e.attempts(),
                }
            }
        };

        PaneReport {
            host: name.to_string(),
            window: Some(window.to_string()),
            pane_id: pane.map(|p| p.pane_id),
            status,
        }
    }

    /// One launch attempt. The pane is split once and reused by later attempts.
    async fn try_launch(
        &self,
        pane: &Mutex<Option<PaneRef>>,
        window_pane: &PaneRef,
        resolved: &Resolved<'_>,
    ) -> Result<(), AttemptError> {
        let existing = pane.lock().clone();
        let current = match existing {
            Some(current) => current,
            None => {
                let split = self
                    .backend
                    .split_pane(window_pane)
                    .await
                    .map_err(mux_failure)?;
                *pane.lock() = Some(split.clone());
                split
            }
        };

        if current != *window_pane {
            self.backend
                .select_layout(&current.window_id, self.config.tmux.layout)
                .await
                .map_err(mux_failure)?;
        }

        self.backend
            .set_pane_title(&current, resolved.host.display_name())
            .await
            .map_err(mux_failure)?;

        if let (true, Some(probe)) = (self.config.ssh.preflight, self.probe) {
            probe.probe(&resolved.target).await?;
        }

        self.backend
            .send_keys(&current, &ssh::ssh_command_line(&resolved.target))
            .await
            .map_err(mux_failure)
    }

    async fn mark_failed(&self, pane: &PaneRef, name: &str, err: &ConnectError) {
        let title = format!("FAILED {}", name);
        if let Err(e) = self.backend.set_pane_title(pane, &title).await {
            warn!("Could not retitle failed pane {}: {}", pane.pane_id, e);
        }
        let message = format!("FAILED {}: {}", name, err.last_error());
        let echo = format!("echo {}", shell_words::quote(&message));
        if let Err(e) = self.backend.send_keys(pane, &echo).await {
            warn!("Could not show failure in pane {}: {}", pane.pane_id, e);
        }
    }
}

/// Multiplexer hiccups are worth another attempt
fn mux_failure(err: MuxError) -> AttemptError {
    AttemptError::transient(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PaneLayout;
    use crate::retry::{AttemptError, FailureKind};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct FakeState {
        calls: Vec<String>,
        windows: u32,
        panes: u32,
    }

    /// Records every call; `fail_on` makes the named operation error out.
    /// `flaky` entries fail an operation whose detail starts with a prefix,
    /// a limited number of times (`u32::MAX` for always).
    #[derive(Default)]
    struct FakeBackend {
        state: Mutex<FakeState>,
        existing: HashSet<String>,
        fail_on: Option<&'static str>,
        flaky: Mutex<Vec<(&'static str, &'static str, u32)>>,
    }

    impl FakeBackend {
        fn failing(op: &'static str) -> Self {
            Self {
                fail_on: Some(op),
                ..Default::default()
            }
        }

        fn flaky(op: &'static str, prefix: &'static str, times: u32) -> Self {
            Self {
                flaky: Mutex::new(vec![(op, prefix, times)]),
                ..Default::default()
            }
        }

        fn record(&self, op: &'static str, detail: String) -> Result<(), MuxError> {
            let injected = || MuxError::Command {
                command: op.to_string(),
                stderr: "injected".to_string(),
            };
            if self.fail_on == Some(op) {
                self.push_call(op, &detail);
                return Err(injected());
            }
            let mut flaky = self.flaky.lock().unwrap();
            for (flaky_op, prefix, remaining) in flaky.iter_mut() {
                if *flaky_op == op && detail.starts_with(*prefix) && *remaining > 0 {
                    if *remaining != u32::MAX {
                        *remaining -= 1;
                    }
                    self.push_call(op, &detail);
                    return Err(injected());
                }
            }
            drop(flaky);
            self.push_call(op, &detail);
            Ok(())
        }

        fn push_call(&self, op: &str, detail: &str) {
            self.state
                .lock()
                .unwrap()
                .calls
                .push(format!("{} {}", op, detail).trim_end().to_string());
        }

        fn next_pane(&self, new_window: bool) -> PaneRef {
            let mut state = self.state.lock().unwrap();
            if new_window {
                state.windows += 1;
            }
            state.panes += 1;
            PaneRef {
                window_id: format!("@{}", state.windows),
                pane_id: format!("%{}", state.panes),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.state.lock().unwrap().calls.clone()
        }

        fn count(&self, op: &str) -> usize {
            self.calls()
                .iter()
                .filter(|c| c.split(' ').next() == Some(op))
                .count()
        }
    }

    #[async_trait]
    impl SessionBackend for FakeBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Multiplexer
        }
        async fn prepare(&self) -> Result<String, MuxError> {
            self.record("prepare", String::new())?;
            Ok("tmux 3.4".into())
        }
        async fn has_session(&self, name: &str) -> Result<bool, MuxError> {
            Ok(self.existing.contains(name))
        }
        async fn create_session(&self, name: &str, window: &str) -> Result<PaneRef, MuxError> {
            self.record("create_session", format!("{} {}", name, window))?;
            Ok(self.next_pane(true))
        }
        async fn new_window(&self, _session: &str, window: &str) -> Result<PaneRef, MuxError> {
            self.record("new_window", window.to_string())?;
            Ok(self.next_pane(true))
        }
        async fn split_pane(&self, pane: &PaneRef) -> Result<PaneRef, MuxError> {
            self.record("split_pane", pane.pane_id.clone())?;
            let mut next = self.next_pane(false);
            next.window_id = pane.window_id.clone();
            Ok(next)
        }
        async fn select_layout(&self, window_id: &str, layout: PaneLayout) -> Result<(), MuxError> {
            self.record("select_layout", format!("{} {}", window_id, layout.as_tmux()))
        }
        async fn set_pane_title(&self, pane: &PaneRef, title: &str) -> Result<(), MuxError> {
            self.record("set_pane_title", format!("{} {}", pane.pane_id, title))
        }
        async fn send_keys(&self, pane: &PaneRef, line: &str) -> Result<(), MuxError> {
            self.record("send_keys", format!("{} {}", pane.pane_id, line))
        }
        async fn set_synchronize(&self, window_id: &str, enabled: bool) -> Result<(), MuxError> {
            self.record("set_synchronize", format!("{} {}", window_id, enabled))
        }
        async fn bind_broadcast_toggle(&self) -> Result<(), MuxError> {
            self.record("bind_broadcast_toggle", String::new())
        }
        async fn kill_session(&self, name: &str) -> Result<(), MuxError> {
            self.record("kill_session", name.to_string())
        }
        async fn attach(&self, name: &str) -> Result<AttachOutcome, MuxError> {
            self.record("attach", name.to_string())?;
            Ok(AttachOutcome::Attached { exit_code: Some(0) })
        }
    }

    /// Fails every probe against the listed addresses
    struct FakeProbe {
        unreachable: HashSet<String>,
        kind: FailureKind,
    }

    #[async_trait]
    impl ConnectionProbe for FakeProbe {
        async fn probe(&self, target: &SshTarget) -> Result<(), AttemptError> {
            if self.unreachable.contains(&target.address) {
                Err(AttemptError::new(self.kind, "Permission denied (publickey)."))
            } else {
                Ok(())
            }
        }
    }

    fn hosts(n: usize) -> Vec<Host> {
        (1..=n)
            .map(|i| Host::new(format!("web-{:02}", i), format!("10.0.0.{}", i)))
            .collect()
    }

    fn request(hosts: Vec<Host>) -> SessionRequest {
        SessionRequest {
            hosts,
            mode: SessionMode::Panes,
            broadcast: false,
            attach: false,
        }
    }

    #[tokio::test]
    async fn test_seven_hosts_two_windows() {
        let backend = FakeBackend::default();
        let config = Config::default();
        let report = SessionEngine::new(&backend, &config)
            .build(&request(hosts(7)))
            .await
            .unwrap();

        assert_eq!(backend.count("create_session"), 1);
        assert_eq!(backend.count("new_window"), 1);
        assert_eq!(backend.count("split_pane"), 5);
        assert_eq!(backend.count("select_layout"), 5);
        assert_eq!(backend.count("send_keys"), 7);

        assert_eq!(report.connected(), 7);
        assert!(!report.is_partial());
        let windows: Vec<_> = report.panes.iter().map(|p| p.window.clone().unwrap()).collect();
        assert_eq!(windows[4], "sshplex");
        assert_eq!(windows[5], "sshplex-2");
        assert!(report.session_name.starts_with("sshplex-"));
        assert!(report.attach.is_none());
    }

    #[tokio::test]
    async fn test_panes_follow_selection_order() {
        let backend = FakeBackend::default();
        let config = Config::default();
        let report = SessionEngine::new(&backend, &config)
            .build(&request(hosts(3)))
            .await
            .unwrap();

        let names: Vec<&str> = report.panes.iter().map(|p| p.host.as_str()).collect();
        assert_eq!(names, vec!["web-01", "web-02", "web-03"]);

        let keys: Vec<String> = backend
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("send_keys"))
            .collect();
        assert!(keys[0].contains("admin@10.0.0.1"));
        assert!(keys[2].contains("admin@10.0.0.3"));
    }

    #[tokio::test]
    async fn test_invalid_target_skipped_and_reported() {
        let mut selection = hosts(3);
        selection[1].ssh_port = Some(70000);

        let backend = FakeBackend::default();
        let config = Config::default();
        let report = SessionEngine::new(&backend, &config)
            .build(&request(selection))
            .await
            .unwrap();

        assert_eq!(report.connected(), 2);
        assert_eq!(report.invalid(), 1);
        assert!(report.is_partial());
        assert_eq!(backend.count("split_pane"), 1);

        let bad = report.panes.iter().find(|p| p.host == "web-02").unwrap();
        assert!(bad.pane_id.is_none());
        assert!(matches!(&bad.status, PaneStatus::InvalidTarget { reason } if reason.contains("70000")));
    }

    #[tokio::test]
    async fn test_all_invalid_is_empty_selection() {
        let mut config = Config::default();
        config.ssh.username = String::new();

        let backend = FakeBackend::default();
        let err = SessionEngine::new(&backend, &config)
            .build(&request(hosts(2)))
            .await
            .unwrap_err();

        match err {
            SessionError::EmptySelection { invalid } => {
                let rejected: Vec<&str> = invalid.iter().map(|p| p.host.as_str()).collect();
                assert_eq!(rejected, vec!["web-01", "web-02"]);
                assert!(invalid
                    .iter()
                    .all(|p| matches!(p.status, PaneStatus::InvalidTarget { .. })));
            }
            other => panic!("expected an empty selection, got {:?}", other),
        }
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_probe_keeps_pane_and_marks_it() {
        let mut config = Config::default();
        config.ssh.preflight = true;
        let probe = FakeProbe {
            unreachable: ["10.0.0.2".to_string()].into_iter().collect(),
            kind: FailureKind::Authentication,
        };

        let backend = FakeBackend::default();
        let report = SessionEngine::new(&backend, &config)
            .with_probe(&probe)
            .build(&request(hosts(3)))
            .await
            .unwrap();

        assert_eq!(report.connected(), 2);
        assert_eq!(report.failed(), 1);
        let failed = &report.panes[1];
        assert_eq!(failed.pane_id.as_deref(), Some("%2"));
        assert!(matches!(failed.status, PaneStatus::Failed { attempts: 1, .. }));

        let calls = backend.calls();
        assert!(calls.contains(&"set_pane_title %2 FAILED web-02".to_string()));
        assert!(calls
            .iter()
            .any(|c| c.starts_with("send_keys %2 echo") && c.contains("Permission denied")));
        assert!(!calls.iter().any(|c| c.starts_with("send_keys %2 TERM=")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_probe_failure_uses_all_attempts() {
        let mut config = Config::default();
        config.ssh.preflight = true;
        let probe = FakeProbe {
            unreachable: ["10.0.0.1".to_string()].into_iter().collect(),
            kind: FailureKind::Transient,
        };

        let backend = FakeBackend::default();
        let report = SessionEngine::new(&backend, &config)
            .with_probe(&probe)
            .build(&request(hosts(1)))
            .await
            .unwrap();

        assert!(matches!(report.panes[0].status, PaneStatus::Failed { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn test_broadcast_synchronizes_every_window() {
        let mut config = Config::default();
        config.tmux.max_panes_per_window = 2;

        let backend = FakeBackend::default();
        let mut req = request(hosts(5));
        req.broadcast = true;
        let report = SessionEngine::new(&backend, &config).build(&req).await.unwrap();

        assert!(report.broadcast);
        assert_eq!(backend.count("set_synchronize"), 3);
        assert_eq!(backend.count("bind_broadcast_toggle"), 1);
        // synchronization is the last step before attach
        assert!(backend.calls().last().unwrap().starts_with("set_synchronize"));
    }

    #[tokio::test]
    async fn test_windows_mode_one_window_per_host() {
        let backend = FakeBackend::default();
        let config = Config::default();
        let mut req = request(hosts(3));
        req.mode = SessionMode::Windows;
        let report = SessionEngine::new(&backend, &config).build(&req).await.unwrap();

        assert_eq!(backend.count("new_window"), 2);
        assert_eq!(backend.count("split_pane"), 0);
        assert_eq!(report.panes[2].window.as_deref(), Some("web-03"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_flaky_send_keys_is_retried() {
        let backend = FakeBackend::flaky("send_keys", "%2 ", 1);
        let config = Config::default();
        let start = tokio::time::Instant::now();
        let report = SessionEngine::new(&backend, &config)
            .build(&request(hosts(3)))
            .await
            .unwrap();

        assert_eq!(report.connected(), 3);
        assert!(!report.is_partial());
        // one retry after the 2s base delay, and the pane was split only once
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(2), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(3), "elapsed {:?}", elapsed);
        assert_eq!(backend.count("split_pane"), 2);
        let resent = backend
            .calls()
            .iter()
            .filter(|c| c.starts_with("send_keys %2 "))
            .count();
        assert_eq!(resent, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pane_exhausting_retries_is_kept_failed() {
        let backend = FakeBackend::flaky("send_keys", "%2 TERM=", u32::MAX);
        let config = Config::default();
        let report = SessionEngine::new(&backend, &config)
            .build(&request(hosts(3)))
            .await
            .unwrap();

        assert_eq!(report.connected(), 2);
        assert_eq!(report.failed(), 1);
        let failed = &report.panes[1];
        assert_eq!(failed.host, "web-02");
        assert_eq!(failed.pane_id.as_deref(), Some("%2"));
        assert!(matches!(failed.status, PaneStatus::Failed { attempts: 3, .. }));

        let calls = backend.calls();
        assert!(calls.contains(&"set_pane_title %2 FAILED web-02".to_string()));
        assert!(calls.iter().any(|c| c.starts_with("send_keys %2 echo")));
        assert!(calls.iter().any(|c| c.starts_with("send_keys %3 TERM=")));
        assert_eq!(backend.count("kill_session"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_split_failure_marks_pane_failed_without_pane() {
        let backend = FakeBackend::flaky("split_pane", "%1", u32::MAX);
        let config = Config::default();
        let report = SessionEngine::new(&backend, &config)
            .build(&request(hosts(2)))
            .await
            .unwrap();

        assert_eq!(report.connected(), 1);
        let failed = &report.panes[1];
        assert!(failed.pane_id.is_none());
        assert!(matches!(failed.status, PaneStatus::Failed { attempts: 3, .. }));
        assert_eq!(backend.count("split_pane"), 3);
    }

    #[tokio::test]
    async fn test_create_session_failure_is_layout_failed() {
        let backend = FakeBackend::failing("create_session");
        let config = Config::default();
        let err = SessionEngine::new(&backend, &config)
            .build(&request(hosts(3)))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SessionError::LayoutFailed {
                stage: LayoutState::Creating,
                ..
            }
        ));
        assert_eq!(backend.count("split_pane"), 0);
        assert_eq!(backend.count("kill_session"), 0);
    }

    #[tokio::test]
    async fn test_window_creation_failure_kills_session() {
        let backend = FakeBackend::failing("new_window");
        let mut config = Config::default();
        config.tmux.max_panes_per_window = 2;
        let err = SessionEngine::new(&backend, &config)
            .build(&request(hosts(3)))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SessionError::LayoutFailed {
                stage: LayoutState::Populating,
                ..
            }
        ));
        assert_eq!(backend.count("kill_session"), 1);
    }

    #[tokio::test]
    async fn test_unavailable_multiplexer_creates_nothing() {
        let backend = FakeBackend::failing("prepare");
        let config = Config::default();
        let err = SessionEngine::new(&backend, &config)
            .build(&request(hosts(2)))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SessionError::LayoutFailed {
                stage: LayoutState::Planning,
                ..
            }
        ));
        assert_eq!(backend.count("create_session"), 0);
        assert_eq!(backend.count("kill_session"), 0);
    }

    #[tokio::test]
    async fn test_toggle_binding_failure_is_a_warning() {
        let backend = FakeBackend::failing("bind_broadcast_toggle");
        let config = Config::default();
        let report = SessionEngine::new(&backend, &config)
            .build(&request(hosts(1)))
            .await
            .unwrap();

        assert_eq!(report.connected(), 1);
        assert_eq!(report.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_attach_failure_degrades_to_manual() {
        let backend = FakeBackend::failing("attach");
        let config = Config::default();
        let mut req = request(hosts(1));
        req.attach = true;
        let report = SessionEngine::new(&backend, &config).build(&req).await.unwrap();

        match report.attach {
            Some(AttachOutcome::Manual { instruction }) => {
                assert!(instruction.contains(&report.session_name))
            }
            other => panic!("expected manual attach, got {:?}", other),
        }
    }
}
