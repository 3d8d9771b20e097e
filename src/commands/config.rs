//! Config Commands

use serde::Serialize;

use crate::cache::{CacheInfo, HostCache};
use crate::config::{Config, ProviderSource};

const REDACTED: &str = "********";

/// Effective configuration plus cache state, for `show-config`
#[derive(Debug, Clone, Serialize)]
pub struct ConfigOverview {
    pub config: Config,
    pub fingerprint: String,
    pub cache: Option<CacheInfo>,
}

/// Copy of `config` with provider credentials blanked out
pub fn redacted(config: &Config) -> Config {
    let mut config = config.clone();
    for import in &mut config.sot.imports {
        let token = match &mut import.source {
            ProviderSource::Netbox { token, .. } => token,
            ProviderSource::Consul { config } => &mut config.token,
            _ => continue,
        };
        if !token.is_empty() {
            *token = REDACTED.to_string();
        }
    }
    config
}

pub fn show_config(config: &Config, cache: &HostCache) -> ConfigOverview {
    let cache_info = match cache.info() {
        Ok(info) => info,
        Err(e) => {
            tracing::warn!("Cannot read cache state: {}", e);
            None
        }
    };
    ConfigOverview {
        fingerprint: config.provider_fingerprint(),
        config: redacted(config),
        cache: cache_info,
    }
}
