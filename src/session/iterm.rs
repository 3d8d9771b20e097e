//! iTerm2 backend
//!
//! The session itself is built with tmux. iTerm2 then attaches to it in tmux
//! control mode (`tmux -CC`), which turns tmux windows into native tabs and
//! panes into native splits. iTerm2 is driven through AppleScript.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::process::Command;

use super::backend::{
    manual_attach_instruction, AttachOutcome, BackendKind, PaneRef, SessionBackend,
};
use super::error::MuxError;
use super::tmux::TmuxBackend;
use crate::config::PaneLayout;

const APP_NAME: &str = "iTerm2";

const INSTALL_HINT: &str =
    "Install iTerm2 from https://iterm2.com or set tmux.control_with_iterm2 to false.";

/// Runs one AppleScript snippet and returns its trimmed output
#[async_trait]
pub trait AppleScriptRunner: Send + Sync {
    async fn run(&self, script: &str) -> Result<String, MuxError>;
}

/// `osascript -e <script>`
pub struct OsaScript;

#[async_trait]
impl AppleScriptRunner for OsaScript {
    async fn run(&self, script: &str) -> Result<String, MuxError> {
        let output = Command::new("osascript")
            .arg("-e")
            .arg(script)
            .output()
            .await
            .map_err(|e| MuxError::Automation(format!("failed to run osascript: {}", e)))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(MuxError::Automation(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ))
        }
    }
}

/// Quote a string for an AppleScript string literal
fn applescript_string(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

fn installed_script() -> String {
    format!("exists application {}", applescript_string(APP_NAME))
}

fn running_script() -> String {
    format!("application {} is running", applescript_string(APP_NAME))
}

fn activate_script() -> String {
    format!("tell application {} to activate", applescript_string(APP_NAME))
}

fn attach_script(session: &str) -> String {
    let command = format!(
        "tmux -CC attach-session -t {}; exit",
        shell_words::quote(session)
    );
    format!(
        "tell application {app}\n\
         \tactivate\n\
         \tset newWindow to (create window with default profile)\n\
         \ttell current session of newWindow\n\
         \t\twrite text {command}\n\
         \tend tell\n\
         end tell",
        app = applescript_string(APP_NAME),
        command = applescript_string(&command),
    )
}

/// tmux for layout, iTerm2 for presentation
pub struct ItermBackend {
    tmux: TmuxBackend,
    runner: Box<dyn AppleScriptRunner>,
    /// Set when the scripting bridge failed during detection
    degraded: AtomicBool,
}

impl ItermBackend {
    pub fn new(tmux: TmuxBackend) -> Self {
        Self::with_runner(tmux, Box::new(OsaScript))
    }

    pub fn with_runner(tmux: TmuxBackend, runner: Box<dyn AppleScriptRunner>) -> Self {
        Self {
            tmux,
            runner,
            degraded: AtomicBool::new(false),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    fn degrade(&self, err: &MuxError) {
        tracing::warn!(
            "{} automation unavailable, the session will need a manual attach: {}",
            APP_NAME,
            err
        );
        self.degraded.store(true, Ordering::Relaxed);
    }

    /// Installed/running detection. Only "definitely not installed" is fatal.
    async fn detect_app(&self) -> Result<(), MuxError> {
        match self.runner.run(&installed_script()).await {
            Ok(answer) if answer == "false" => {
                return Err(MuxError::AppNotInstalled {
                    app: APP_NAME.to_string(),
                    hint: INSTALL_HINT.to_string(),
                })
            }
            Ok(_) => {}
            Err(e) => {
                self.degrade(&e);
                return Ok(());
            }
        }

        match self.runner.run(&running_script()).await {
            Ok(answer) if answer == "true" => Ok(()),
            Ok(_) => {
                tracing::info!("{} is not running, launching it", APP_NAME);
                if let Err(e) = self.runner.run(&activate_script()).await {
                    self.degrade(&e);
                }
                Ok(())
            }
            Err(e) => {
                self.degrade(&e);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl SessionBackend for ItermBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::NativeTerminal
    }

    async fn prepare(&self) -> Result<String, MuxError> {
        let version = self.tmux.prepare().await?;
        self.detect_app().await?;
        Ok(format!("{} ({} control mode)", version, APP_NAME))
    }

    async fn has_session(&self, name: &str) -> Result<bool, MuxError> {
        self.tmux.has_session(name).await
    }

    async fn create_session(&self, name: &str, window_name: &str) -> Result<PaneRef, MuxError> {
        self.tmux.create_session(name, window_name).await
    }

    async fn new_window(&self, session: &str, window_name: &str) -> Result<PaneRef, MuxError> {
        self.tmux.new_window(session, window_name).await
    }

    async fn split_pane(&self, pane: &PaneRef) -> Result<PaneRef, MuxError> {
        self.tmux.split_pane(pane).await
    }

    async fn select_layout(&self, window_id: &str, layout: PaneLayout) -> Result<(), MuxError> {
        self.tmux.select_layout(window_id, layout).await
    }

    async fn set_pane_title(&self, pane: &PaneRef, title: &str) -> Result<(), MuxError> {
        self.tmux.set_pane_title(pane, title).await
    }

    async fn send_keys(&self, pane: &PaneRef, line: &str) -> Result<(), MuxError> {
        self.tmux.send_keys(pane, line).await
    }

    async fn set_synchronize(&self, window_id: &str, enabled: bool) -> Result<(), MuxError> {
        self.tmux.set_synchronize(window_id, enabled).await
    }

    async fn bind_broadcast_toggle(&self) -> Result<(), MuxError> {
        self.tmux.bind_broadcast_toggle().await
    }

    async fn kill_session(&self, name: &str) -> Result<(), MuxError> {
        self.tmux.kill_session(name).await
    }

    async fn attach(&self, name: &str) -> Result<AttachOutcome, MuxError> {
        let manual = AttachOutcome::Manual {
            instruction: manual_attach_instruction(name),
        };
        if self.is_degraded() {
            return Ok(manual);
        }

        match self.runner.run(&attach_script(name)).await {
            Ok(_) => {
                tracing::info!("Opened session '{}' in {}", name, APP_NAME);
                Ok(AttachOutcome::Launched)
            }
            Err(e) => {
                self.degrade(&e);
                Ok(manual)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Replays canned answers and records the scripts it was given
    #[derive(Clone, Default)]
    struct FakeRunner {
        answers: Arc<Mutex<VecDeque<Result<String, MuxError>>>>,
        scripts: Arc<Mutex<Vec<String>>>,
    }

    impl FakeRunner {
        fn answering(answers: Vec<Result<&str, MuxError>>) -> Self {
            let runner = Self::default();
            *runner.answers.lock().unwrap() = answers
                .into_iter()
                .map(|a| a.map(str::to_string))
                .collect();
            runner
        }

        fn scripts(&self) -> Vec<String> {
            self.scripts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AppleScriptRunner for FakeRunner {
        async fn run(&self, script: &str) -> Result<String, MuxError> {
            self.scripts.lock().unwrap().push(script.to_string());
            self.answers
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(String::new()))
        }
    }

    fn backend(runner: &FakeRunner) -> ItermBackend {
        ItermBackend::with_runner(TmuxBackend::new(), Box::new(runner.clone()))
    }

    #[test]
    fn test_attach_script_escapes_session_name() {
        let script = attach_script("odd\"name");
        assert!(script.contains("create window with default profile"));
        assert!(script.contains("tmux -CC attach-session -t"));
        assert!(script.contains("\\\""));
    }

    #[tokio::test]
    async fn test_not_installed_fails_fast() {
        let runner = FakeRunner::answering(vec![Ok("false")]);
        let err = backend(&runner).detect_app().await.unwrap_err();

        assert!(matches!(err, MuxError::AppNotInstalled { .. }));
        assert!(err.to_string().contains("iterm2.com"));
        assert_eq!(runner.scripts().len(), 1);
    }

    #[tokio::test]
    async fn test_not_running_is_activated() {
        let runner = FakeRunner::answering(vec![Ok("true"), Ok("false"), Ok("")]);
        let backend = backend(&runner);
        backend.detect_app().await.unwrap();

        let scripts = runner.scripts();
        assert_eq!(scripts.len(), 3);
        assert_eq!(scripts[2], activate_script());
        assert!(!backend.is_degraded());
    }

    #[tokio::test]
    async fn test_bridge_failure_degrades_to_manual_attach() {
        let runner = FakeRunner::answering(vec![Err(MuxError::Automation(
            "not authorized".into(),
        ))]);
        let backend = backend(&runner);
        backend.detect_app().await.unwrap();
        assert!(backend.is_degraded());

        let outcome = backend.attach("sshplex-1").await.unwrap();
        assert_eq!(
            outcome,
            AttachOutcome::Manual {
                instruction: "tmux attach-session -t sshplex-1".into()
            }
        );
    }

    #[tokio::test]
    async fn test_attach_launches_control_mode() {
        let runner = FakeRunner::answering(vec![Ok("")]);
        let backend = backend(&runner);

        let outcome = backend.attach("sshplex-1").await.unwrap();
        assert_eq!(outcome, AttachOutcome::Launched);
        assert!(runner.scripts()[0].contains("tmux -CC attach-session -t sshplex-1"));
    }

    #[tokio::test]
    async fn test_failed_attach_script_gives_manual_instruction() {
        let runner = FakeRunner::answering(vec![Err(MuxError::Automation("boom".into()))]);
        let outcome = backend(&runner).attach("s").await.unwrap();
        assert!(matches!(outcome, AttachOutcome::Manual { .. }));
    }
}
