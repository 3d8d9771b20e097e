//! Pre-flight reachability probe

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::command::probe_args;
use super::target::SshTarget;
use crate::retry::AttemptError;

/// One non-interactive connection attempt against a target
#[async_trait]
pub trait ConnectionProbe: Send + Sync {
    async fn probe(&self, target: &SshTarget) -> Result<(), AttemptError>;
}

/// Runs `ssh -o BatchMode=yes ... exit` through the system client
pub struct SshProbe {
    program: String,
    /// Hard limit on top of ssh's own ConnectTimeout
    deadline: Duration,
}

impl SshProbe {
    pub fn new() -> Self {
        Self {
            program: "ssh".to_string(),
            deadline: Duration::from_secs(10),
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

impl Default for SshProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConnectionProbe for SshProbe {
    async fn probe(&self, target: &SshTarget) -> Result<(), AttemptError> {
        let child = Command::new(&self.program)
            .args(probe_args(target))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AttemptError::transient(format!("failed to run {}: {}", self.program, e)))?;

        let output = match tokio::time::timeout(self.deadline, child.wait_with_output()).await {
            Ok(result) => result
                .map_err(|e| AttemptError::transient(format!("{} failed: {}", self.program, e)))?,
            Err(_) => {
                return Err(AttemptError::transient(format!(
                    "no answer from {} within {:?}",
                    target.address, self.deadline
                )))
            }
        };

        if output.status.success() {
            Ok(())
        } else {
            Err(AttemptError::from_stderr(&String::from_utf8_lossy(
                &output.stderr,
            )))
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::retry::FailureKind;
    use crate::ssh::HostKeyPolicy;

    fn target() -> SshTarget {
        SshTarget {
            address: "10.0.0.1".into(),
            username: "admin".into(),
            key_path: String::new(),
            port: 22,
            host_key_policy: HostKeyPolicy::Strict,
            known_hosts_file: String::new(),
            connect_timeout: 5,
            proxy: None,
        }
    }

    #[tokio::test]
    async fn test_success_exit_code() {
        let probe = SshProbe::new().with_program("true");
        assert!(probe.probe(&target()).await.is_ok());
    }

    #[tokio::test]
    async fn test_failure_is_classified() {
        let probe = SshProbe::new().with_program("false");
        let err = probe.probe(&target()).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::Transient);
    }

    #[tokio::test]
    async fn test_missing_program() {
        let probe = SshProbe::new().with_program("/nonexistent/ssh-binary");
        let err = probe.probe(&target()).await.unwrap_err();
        assert!(err.message.contains("failed to run"));
    }
}
