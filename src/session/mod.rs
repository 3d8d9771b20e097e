//! Session Module
//!
//! Builds the multiplexed terminal session for a host selection, either in
//! plain tmux or in iTerm2 through tmux control mode.

mod backend;
mod error;
mod iterm;
mod layout;
mod naming;
mod orchestrator;
mod tmux;

pub use backend::{manual_attach_instruction, AttachOutcome, BackendKind, PaneRef, SessionBackend};
pub use error::{MuxError, SessionError};
pub use iterm::{AppleScriptRunner, ItermBackend, OsaScript};
pub use layout::{plan_windows, SessionMode, WindowPlan};
pub use naming::{base_name, unique_session_name};
pub use orchestrator::{
    LayoutState, PaneReport, PaneStatus, SessionEngine, SessionReport, SessionRequest,
};
pub use tmux::TmuxBackend;
