//! Provider error types

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Inventory error: {0}")]
    Inventory(String),

    #[error("Invalid filter '{filter}': {message}")]
    InvalidFilter { filter: String, message: String },

    #[error("Timed out after {0}s")]
    Timeout(u64),

    /// The adapter was compiled out of this build.
    #[error("{provider} support is not available in this build (rebuild with `--features {feature}`)")]
    DependencyMissing {
        provider: &'static str,
        feature: &'static str,
    },
}

impl ProviderError {
    /// Short, stable name of the error kind for reports.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::DependencyMissing { .. } => "dependency_missing",
            ProviderError::Timeout(_) => "timeout",
            ProviderError::InvalidFilter { .. } => "invalid_filter",
            ProviderError::Fetch(_) | ProviderError::Http(_) | ProviderError::Inventory(_) => {
                "fetch"
            }
        }
    }

    pub fn is_dependency_missing(&self) -> bool {
        matches!(self, ProviderError::DependencyMissing { .. })
    }
}

impl From<std::io::Error> for ProviderError {
    fn from(err: std::io::Error) -> Self {
        ProviderError::Inventory(err.to_string())
    }
}

impl From<serde_yaml::Error> for ProviderError {
    fn from(err: serde_yaml::Error) -> Self {
        ProviderError::Inventory(format!("invalid YAML: {}", err))
    }
}

#[cfg(any(feature = "netbox", feature = "consul"))]
impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Http(format!("request timed out: {}", err))
        } else {
            ProviderError::Http(err.to_string())
        }
    }
}

// Serialized as its message for the debug report
impl serde::Serialize for ProviderError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
