//! Session error types

use thiserror::Error;

use super::orchestrator::{LayoutState, PaneReport};

/// Errors from a multiplexer or terminal-app backend
#[derive(Error, Debug, Clone)]
pub enum MuxError {
    #[error("{program} not found. {hint}")]
    NotInstalled { program: String, hint: String },

    #[error("`{command}` failed: {stderr}")]
    Command { command: String, stderr: String },

    #[error("IO error: {0}")]
    Io(String),

    #[error("Unexpected output from {command}: {output:?}")]
    UnexpectedOutput { command: String, output: String },

    /// The terminal app's scripting bridge failed
    #[error("Automation failed: {0}")]
    Automation(String),

    #[error("{app} is not installed. {hint}")]
    AppNotInstalled { app: String, hint: String },
}

impl From<std::io::Error> for MuxError {
    fn from(err: std::io::Error) -> Self {
        MuxError::Io(err.to_string())
    }
}

/// Fatal session-level failures. Host-level problems never end up here.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session layout failed while {stage}: {source}")]
    LayoutFailed {
        stage: LayoutState,
        #[source]
        source: MuxError,
    },

    /// Every selected host was rejected; `invalid` says why for each
    #[error("No connectable hosts in the selection ({} rejected)", .invalid.len())]
    EmptySelection { invalid: Vec<PaneReport> },
}

impl SessionError {
    pub fn layout(stage: LayoutState, source: MuxError) -> Self {
        SessionError::LayoutFailed { stage, source }
    }
}
