//! Session backend interface
//!
//! The layout engine only talks to this trait. The tmux backend drives tmux
//! directly; the iTerm2 backend builds the same tmux session and attaches it
//! through tmux control mode so windows and panes become native tabs and splits.

use async_trait::async_trait;
use serde::Serialize;

use super::error::MuxError;
use crate::config::PaneLayout;

/// A pane and the window holding it (tmux `#{window_id}` / `#{pane_id}`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaneRef {
    pub window_id: String,
    pub pane_id: String,
}

/// Which backend realizes the plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    Multiplexer,
    NativeTerminal,
}

/// What happened when handing the session to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttachOutcome {
    /// Attached in this terminal; the attach process has exited
    Attached { exit_code: Option<i32> },
    /// Opened in the terminal application
    Launched,
    /// Automation unavailable: the user has to run this themselves
    Manual { instruction: String },
}

/// Hint shown when the session has to be attached by hand
pub fn manual_attach_instruction(session: &str) -> String {
    format!("tmux attach-session -t {}", shell_words::quote(session))
}

#[async_trait]
pub trait SessionBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Detection before anything is created. Returns the backend version or
    /// an actionable error when a required program or application is missing.
    async fn prepare(&self) -> Result<String, MuxError>;

    async fn has_session(&self, name: &str) -> Result<bool, MuxError>;

    /// Create a detached session; returns its first pane
    async fn create_session(&self, name: &str, window_name: &str) -> Result<PaneRef, MuxError>;

    async fn new_window(&self, session: &str, window_name: &str) -> Result<PaneRef, MuxError>;

    async fn split_pane(&self, pane: &PaneRef) -> Result<PaneRef, MuxError>;

    async fn select_layout(&self, window_id: &str, layout: PaneLayout) -> Result<(), MuxError>;

    async fn set_pane_title(&self, pane: &PaneRef, title: &str) -> Result<(), MuxError>;

    /// Type `line` into the pane and press Enter
    async fn send_keys(&self, pane: &PaneRef, line: &str) -> Result<(), MuxError>;

    async fn set_synchronize(&self, window_id: &str, enabled: bool) -> Result<(), MuxError>;

    /// Install the `prefix + b` broadcast toggle
    async fn bind_broadcast_toggle(&self) -> Result<(), MuxError>;

    async fn kill_session(&self, name: &str) -> Result<(), MuxError>;

    /// Hand the session to the user
    async fn attach(&self, name: &str) -> Result<AttachOutcome, MuxError>;
}
