//! tmux backend
//!
//! Every operation is one `tmux` invocation. Argument vectors are built by
//! plain functions so they can be checked without a tmux server.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

use super::backend::{AttachOutcome, BackendKind, PaneRef, SessionBackend};
use super::error::MuxError;
use crate::config::PaneLayout;

const PANE_FORMAT: &str = "#{window_id} #{pane_id}";

const INSTALL_HINT: &str =
    "Install tmux (e.g. `brew install tmux` or `apt install tmux`) and try again.";

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

/// `=name` matches the session name exactly instead of by prefix
fn exact(session: &str) -> String {
    format!("={}", session)
}

pub(crate) fn has_session_args(name: &str) -> Vec<String> {
    strings(&["has-session", "-t", &exact(name)])
}

pub(crate) fn new_session_args(name: &str, window_name: &str) -> Vec<String> {
    strings(&[
        "new-session", "-d", "-s", name, "-n", window_name, "-P", "-F", PANE_FORMAT,
    ])
}

pub(crate) fn new_window_args(session: &str, window_name: &str) -> Vec<String> {
    let target = format!("{}:", exact(session));
    strings(&[
        "new-window", "-d", "-t", &target, "-n", window_name, "-P", "-F", PANE_FORMAT,
    ])
}

pub(crate) fn split_window_args(pane_id: &str) -> Vec<String> {
    strings(&["split-window", "-t", pane_id, "-P", "-F", PANE_FORMAT])
}

pub(crate) fn select_layout_args(window_id: &str, layout: PaneLayout) -> Vec<String> {
    strings(&["select-layout", "-t", window_id, layout.as_tmux()])
}

pub(crate) fn pane_title_args(pane_id: &str, title: &str) -> Vec<String> {
    strings(&["select-pane", "-t", pane_id, "-T", title])
}

pub(crate) fn send_keys_args(pane_id: &str, line: &str) -> Vec<String> {
    strings(&["send-keys", "-t", pane_id, "-l", line])
}

pub(crate) fn synchronize_args(window_id: &str, enabled: bool) -> Vec<String> {
    strings(&[
        "set-window-option",
        "-t",
        window_id,
        "synchronize-panes",
        if enabled { "on" } else { "off" },
    ])
}

pub(crate) fn broadcast_toggle_args() -> Vec<String> {
    strings(&[
        "bind-key",
        "b",
        "if-shell",
        "-F",
        "#{synchronize-panes}",
        "set-window-option synchronize-panes off ; display-message 'Broadcast OFF'",
        "set-window-option synchronize-panes on ; display-message 'Broadcast ON'",
    ])
}

pub(crate) fn kill_session_args(name: &str) -> Vec<String> {
    strings(&["kill-session", "-t", &exact(name)])
}

/// Attach from a plain terminal, or switch when already inside tmux
pub(crate) fn attach_args(name: &str, inside_tmux: bool) -> Vec<String> {
    if inside_tmux {
        strings(&["switch-client", "-t", &exact(name)])
    } else {
        strings(&["attach-session", "-t", &exact(name)])
    }
}

fn parse_pane_ref(command: &str, output: &str) -> Result<PaneRef, MuxError> {
    let mut parts = output.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(window), Some(pane)) if window.starts_with('@') && pane.starts_with('%') => {
            Ok(PaneRef {
                window_id: window.to_string(),
                pane_id: pane.to_string(),
            })
        }
        _ => Err(MuxError::UnexpectedOutput {
            command: command.to_string(),
            output: output.to_string(),
        }),
    }
}

/// Drives the `tmux` binary
#[derive(Debug, Clone)]
pub struct TmuxBackend {
    program: String,
}

impl TmuxBackend {
    pub fn new() -> Self {
        Self {
            program: "tmux".to_string(),
        }
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn not_installed(&self) -> MuxError {
        MuxError::NotInstalled {
            program: self.program.clone(),
            hint: INSTALL_HINT.to_string(),
        }
    }

    /// Run tmux and return trimmed stdout; non-zero exit is an error
    async fn run(&self, args: Vec<String>) -> Result<String, MuxError> {
        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => self.not_installed(),
                _ => MuxError::from(e),
            })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(MuxError::Command {
                command: format!("{} {}", self.program, args.first().map(String::as_str).unwrap_or("")),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    async fn run_pane(&self, args: Vec<String>) -> Result<PaneRef, MuxError> {
        let command = args.first().cloned().unwrap_or_default();
        let output = self.run(args).await?;
        parse_pane_ref(&command, &output)
    }
}

impl Default for TmuxBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionBackend for TmuxBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Multiplexer
    }

    async fn prepare(&self) -> Result<String, MuxError> {
        let version = self.run(strings(&["-V"])).await?;
        tracing::debug!("Using {}", version);
        Ok(version)
    }

    async fn has_session(&self, name: &str) -> Result<bool, MuxError> {
        match self.run(has_session_args(name)).await {
            Ok(_) => Ok(true),
            // Unknown session, or no server running at all
            Err(MuxError::Command { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn create_session(&self, name: &str, window_name: &str) -> Result<PaneRef, MuxError> {
        self.run_pane(new_session_args(name, window_name)).await
    }

    async fn new_window(&self, session: &str, window_name: &str) -> Result<PaneRef, MuxError> {
        self.run_pane(new_window_args(session, window_name)).await
    }

    async fn split_pane(&self, pane: &PaneRef) -> Result<PaneRef, MuxError> {
        self.run_pane(split_window_args(&pane.pane_id)).await
    }

    async fn select_layout(&self, window_id: &str, layout: PaneLayout) -> Result<(), MuxError> {
        self.run(select_layout_args(window_id, layout)).await.map(|_| ())
    }

    async fn set_pane_title(&self, pane: &PaneRef, title: &str) -> Result<(), MuxError> {
        self.run(pane_title_args(&pane.pane_id, title)).await.map(|_| ())
    }

    async fn send_keys(&self, pane: &PaneRef, line: &str) -> Result<(), MuxError> {
        // Literal text first, then Enter as a key name
        self.run(send_keys_args(&pane.pane_id, line)).await?;
        self.run(strings(&["send-keys", "-t", &pane.pane_id, "Enter"]))
            .await
            .map(|_| ())
    }

    async fn set_synchronize(&self, window_id: &str, enabled: bool) -> Result<(), MuxError> {
        self.run(synchronize_args(window_id, enabled)).await.map(|_| ())
    }

    async fn bind_broadcast_toggle(&self) -> Result<(), MuxError> {
        self.run(broadcast_toggle_args()).await.map(|_| ())
    }

    async fn kill_session(&self, name: &str) -> Result<(), MuxError> {
        self.run(kill_session_args(name)).await.map(|_| ())
    }

    async fn attach(&self, name: &str) -> Result<AttachOutcome, MuxError> {
        let inside_tmux = std::env::var_os("TMUX").is_some();
        tracing::info!("Attaching to tmux session '{}'", name);

        // Supervised child: we get control back once the user detaches
        let status = Command::new(&self.program)
            .args(attach_args(name, inside_tmux))
            .status()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => self.not_installed(),
                _ => MuxError::from(e),
            })?;

        tracing::info!("tmux attach for '{}' exited with {}", name, status);
        Ok(AttachOutcome::Attached {
            exit_code: status.code(),
        })
    }
}
