//! Target resolution errors

use thiserror::Error;

/// A host could not be turned into a connectable target.
/// Only that host is skipped; other hosts are unaffected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Empty SSH username")]
    EmptyUsername,

    #[error("Port {0} out of range (1-65535)")]
    PortOutOfRange(u32),

    #[error("Host has neither name nor IP address")]
    MissingAddress,

    #[error("Proxy route '{route}' is invalid: {reason}")]
    InvalidProxy { route: String, reason: String },
}

impl serde::Serialize for ResolveError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
