//! Connection Retry Logic
//!
//! Wraps a single connection attempt with the configured retry policy.
//! Transient failures back off and retry; authentication and host key
//! failures stop immediately.

use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::RetryPolicy;

/// How a failed attempt should be treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Timeouts, refused or reset connections, name resolution
    Transient,
    Authentication,
    HostKeyMismatch,
}

const AUTH_MARKERS: &[&str] = &[
    "permission denied",
    "too many authentication failures",
    "no supported authentication methods",
];

const HOST_KEY_MARKERS: &[&str] = &[
    "remote host identification has changed",
    "host key verification failed",
];

impl FailureKind {
    /// Classify `ssh` diagnostics. Anything unrecognised is transient.
    pub fn classify(stderr: &str) -> Self {
        let lower = stderr.to_lowercase();
        if HOST_KEY_MARKERS.iter().any(|m| lower.contains(m)) {
            FailureKind::HostKeyMismatch
        } else if AUTH_MARKERS.iter().any(|m| lower.contains(m)) {
            FailureKind::Authentication
        } else {
            FailureKind::Transient
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureKind::Transient)
    }
}

/// One failed attempt
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct AttemptError {
    pub kind: FailureKind,
    pub message: String,
}

impl AttemptError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Transient, message)
    }

    /// Build from ssh's stderr
    pub fn from_stderr(stderr: &str) -> Self {
        let message = stderr
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .last()
            .unwrap_or("ssh exited with an error")
            .to_string();
        Self::new(FailureKind::classify(stderr), message)
    }
}

/// Connection failed for good
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConnectError {
    #[error("{target}: failed after {attempts} attempts: {last}")]
    Exhausted {
        target: String,
        attempts: u32,
        last: AttemptError,
    },

    #[error("{target}: {last} (attempt {attempts}, not retried)")]
    Fatal {
        target: String,
        attempts: u32,
        last: AttemptError,
    },
}

impl ConnectError {
    pub fn attempts(&self) -> u32 {
        match self {
            ConnectError::Exhausted { attempts, .. } | ConnectError::Fatal { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn last_error(&self) -> &AttemptError {
        match self {
            ConnectError::Exhausted { last, .. } | ConnectError::Fatal { last, .. } => last,
        }
    }
}

/// Number of attempts the policy allows (always at least one)
pub fn max_attempts(policy: &RetryPolicy) -> u32 {
    if policy.enabled {
        policy.max_attempts.max(1)
    } else {
        1
    }
}

/// Delay before retry number `retry` (1 = after the first failure)
pub fn compute_delay(policy: &RetryPolicy, retry: u32) -> Duration {
    let base = policy.delay_seconds.max(0.0);
    let secs = if policy.exponential_backoff {
        base * 2f64.powi(retry.saturating_sub(1).min(30) as i32)
    } else {
        base
    };
    Duration::from_secs_f64(secs)
}

/// Run `action` until it succeeds, fails fatally, or the policy is exhausted.
///
/// `action` receives the 1-based attempt number.
pub async fn attempt<T, F, Fut>(
    target: &str,
    policy: &RetryPolicy,
    mut action: F,
) -> Result<T, ConnectError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
{
    let max = max_attempts(policy);
    let mut attempt_no = 1;

    loop {
        match action(attempt_no).await {
            Ok(value) => {
                if attempt_no > 1 {
                    info!("{}: connected on attempt {}/{}", target, attempt_no, max);
                }
                return Ok(value);
            }
            Err(e) if !e.kind.is_retryable() => {
                warn!("{}: {:?} failure, not retrying: {}", target, e.kind, e);
                return Err(ConnectError::Fatal {
                    target: target.to_string(),
                    attempts: attempt_no,
                    last: e,
                });
            }
            Err(e) if attempt_no >= max => {
                warn!("{}: giving up after {} attempts: {}", target, attempt_no, e);
                return Err(ConnectError::Exhausted {
                    target: target.to_string(),
                    attempts: attempt_no,
                    last: e,
                });
            }
            Err(e) => {
                let delay = compute_delay(policy, attempt_no);
                info!(
                    "{}: attempt {}/{} failed, retrying in {:?}: {}",
                    target, attempt_no, max, delay, e
                );
                tokio::time::sleep(delay).await;
                attempt_no += 1;
            }
        }
    }
}
