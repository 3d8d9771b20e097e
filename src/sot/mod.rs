//! Sources of Truth
//!
//! Inventory provider adapters. Each adapter turns one [`ProviderImport`] into a
//! normalized [`Host`] list, applying that import's filters itself. Adapters
//! never panic or abort the caller: every failure is returned as a
//! [`ProviderError`] inside a [`FetchResult`] carrying the import's name.

mod ansible;
mod consul;
mod error;
mod filters;
mod netbox;
mod static_list;

pub use ansible::AnsibleProvider;
pub use consul::ConsulProvider;
pub use error::ProviderError;
pub use netbox::NetboxProvider;
pub use static_list::StaticProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::{ProviderImport, ProviderSource};

/// A normalized inventory host
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Host {
    /// Host name (may be empty when `ip` is set)
    #[serde(default)]
    pub name: String,

    /// IP address (may be empty when `name` is set)
    #[serde(default)]
    pub ip: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cluster: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub role: String,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,

    /// Logical name of the import that produced this host
    #[serde(default)]
    pub provider_name: String,

    /// SSH user override (takes precedence over `ssh.username`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_user: Option<String>,

    /// SSH port override (takes precedence over `ssh.port`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_port: Option<u32>,

    /// Provider-specific metadata, not interpreted by the engine
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub raw: BTreeMap<String, serde_json::Value>,
}

impl Host {
    pub fn new(name: impl Into<String>, ip: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ip: ip.into(),
            ..Default::default()
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider_name = provider.into();
        self
    }

    /// A host needs at least a name or an IP to be reachable
    pub fn is_valid(&self) -> bool {
        !self.name.trim().is_empty() || !self.ip.trim().is_empty()
    }

    /// Address to connect to: IP when known, otherwise the name
    pub fn address(&self) -> &str {
        if self.ip.trim().is_empty() {
            self.name.trim()
        } else {
            self.ip.trim()
        }
    }

    /// Label for panes and reports
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            self.ip.trim()
        } else {
            self.name.trim()
        }
    }

    /// Both halves must match for two hosts to be duplicates
    pub fn dedup_key(&self) -> (&str, &str) {
        (self.name.as_str(), self.ip.as_str())
    }

    /// String view of a `raw` metadata value
    pub fn raw_str(&self, key: &str) -> Option<&str> {
        self.raw.get(key).and_then(|v| v.as_str())
    }
}

/// Outcome of fetching one provider import: a host list or an error, never both
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub provider: String,
    pub kind: &'static str,
    pub outcome: Result<Vec<Host>, ProviderError>,
    pub elapsed: Duration,
}

impl FetchResult {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn host_count(&self) -> usize {
        self.outcome.as_ref().map(Vec::len).unwrap_or(0)
    }
}

/// Capability interface implemented by every inventory adapter.
///
/// New provider kinds implement this trait; the aggregator only ever sees
/// `Arc<dyn InventoryProvider>`.
#[async_trait]
pub trait InventoryProvider: Send + Sync {
    /// Logical import name
    fn name(&self) -> &str;

    /// Provider type (`static`, `netbox`, ...)
    fn kind(&self) -> &'static str;

    /// Fetch and filter hosts. Implementations must not set `provider_name`;
    /// [`fetch`] stamps it and drops invalid hosts.
    async fn fetch_hosts(&self) -> Result<Vec<Host>, ProviderError>;
}

/// Build the adapter for an import (closed dispatch over the configured types)
pub fn build_provider(import: &ProviderImport) -> Arc<dyn InventoryProvider> {
    match &import.source {
        ProviderSource::Static { hosts } => Arc::new(StaticProvider::new(
            import.name.clone(),
            hosts.clone(),
            import.filters.clone(),
        )),
        ProviderSource::Netbox {
            url,
            token,
            verify_ssl,
            timeout,
        } => Arc::new(NetboxProvider::new(
            import.name.clone(),
            url.clone(),
            token.clone(),
            *verify_ssl,
            Duration::from_secs(*timeout),
            import.filters.clone(),
        )),
        ProviderSource::Ansible { inventory_paths } => Arc::new(AnsibleProvider::new(
            import.name.clone(),
            inventory_paths.clone(),
            import.filters.clone(),
        )),
        ProviderSource::Consul { config } => Arc::new(ConsulProvider::new(
            import.name.clone(),
            config.clone(),
            import.filters.clone(),
        )),
    }
}

/// Run one provider and wrap its outcome
pub async fn fetch(provider: &dyn InventoryProvider) -> FetchResult {
    let start = Instant::now();
    let name = provider.name().to_string();

    let outcome = provider
        .fetch_hosts()
        .await
        .map(|hosts| finalize_hosts(&name, hosts));

    match &outcome {
        Ok(hosts) => tracing::info!(
            "Provider '{}' ({}) returned {} hosts",
            name,
            provider.kind(),
            hosts.len()
        ),
        Err(e) => tracing::warn!("Provider '{}' ({}) failed: {}", name, provider.kind(), e),
    }

    FetchResult {
        provider: name,
        kind: provider.kind(),
        outcome,
        elapsed: start.elapsed(),
    }
}

/// Tag hosts with their provider and reject the ones with neither name nor ip
fn finalize_hosts(provider: &str, hosts: Vec<Host>) -> Vec<Host> {
    hosts
        .into_iter()
        .filter_map(|mut host| {
            if !host.is_valid() {
                tracing::warn!("Provider '{}' returned a host without name or ip, skipping", provider);
                return None;
            }
            host.provider_name = provider.to_string();
            Some(host)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProvider(Result<Vec<Host>, ProviderError>);

    #[async_trait]
    impl InventoryProvider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        fn kind(&self) -> &'static str {
            "static"
        }

        async fn fetch_hosts(&self) -> Result<Vec<Host>, ProviderError> {
            self.0.clone()
        }
    }

    #[test]
    fn test_host_address_prefers_ip() {
        assert_eq!(Host::new("web-1", "10.0.0.1").address(), "10.0.0.1");
        assert_eq!(Host::new("web-1", "").address(), "web-1");
        assert_eq!(Host::new("", "10.0.0.1").display_name(), "10.0.0.1");
        assert!(!Host::new(" ", "").is_valid());
    }

    #[tokio::test]
    async fn test_fetch_tags_and_validates_hosts() {
        let provider = FixedProvider(Ok(vec![
            Host::new("a", "10.0.0.1"),
            Host::new("", ""),
            Host::new("", "10.0.0.3"),
        ]));

        let result = fetch(&provider).await;
        let hosts = result.outcome.unwrap();
        assert_eq!(hosts.len(), 2);
        assert!(hosts.iter().all(|h| h.provider_name == "fixed"));
        assert_eq!(result.provider, "fixed");
    }

    #[tokio::test]
    async fn test_fetch_carries_error() {
        let provider = FixedProvider(Err(ProviderError::Fetch("boom".to_string())));

        let result = fetch(&provider).await;
        assert!(!result.is_ok());
        assert_eq!(result.host_count(), 0);
        assert_eq!(result.outcome.unwrap_err().kind(), "fetch");
    }

    #[test]
    fn test_build_provider_dispatch() {
        let import: ProviderImport = serde_yaml::from_str(
            "name: lab\ntype: consul\nconfig:\n  host: consul.local\n",
        )
        .unwrap();
        let provider = build_provider(&import);
        assert_eq!(provider.name(), "lab");
        assert_eq!(provider.kind(), "consul");
    }
}
