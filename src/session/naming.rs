//! Session naming
//!
//! Names are `{prefix}-{YYYYmmdd_HHMMSS}`. When that is already taken a
//! numeric suffix is tried, then a random one.

use chrono::{DateTime, Local};

use super::backend::SessionBackend;
use super::error::MuxError;

const MAX_NUMERIC_SUFFIX: u32 = 20;

pub fn base_name(prefix: &str, now: DateTime<Local>) -> String {
    format!("{}-{}", prefix, now.format("%Y%m%d_%H%M%S"))
}

/// First name in `base`, `base-1` .. `base-20`, `base-<random>` that the
/// backend does not already know.
pub async fn unique_session_name(
    backend: &dyn SessionBackend,
    base: &str,
) -> Result<String, MuxError> {
    if !backend.has_session(base).await? {
        return Ok(base.to_string());
    }

    for n in 1..=MAX_NUMERIC_SUFFIX {
        let candidate = format!("{}-{}", base, n);
        if !backend.has_session(&candidate).await? {
            tracing::debug!("Session '{}' exists, using '{}'", base, candidate);
            return Ok(candidate);
        }
    }

    let random = uuid::Uuid::new_v4().simple().to_string();
    let candidate = format!("{}-{}", base, &random[..8]);
    tracing::warn!(
        "Session name '{}' taken {} times, falling back to '{}'",
        base,
        MAX_NUMERIC_SUFFIX + 1,
        candidate
    );
    Ok(candidate)
}
