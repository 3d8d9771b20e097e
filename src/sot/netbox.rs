//! NetBox provider
//!
//! Pulls virtual machines and devices from the NetBox REST API, following
//! pagination. Only objects with a primary IP are kept; IPv4 wins over IPv6
//! and the prefix length is stripped.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use super::{Host, InventoryProvider, ProviderError};
use crate::config::ImportFilters;

/// Filter keys forwarded verbatim as NetBox query parameters
#[cfg_attr(not(feature = "netbox"), allow(dead_code))]
const FORWARDED_FILTERS: &[&str] = &["site", "tenant", "platform", "tag"];

#[cfg_attr(not(feature = "netbox"), allow(dead_code))]
pub struct NetboxProvider {
    name: String,
    url: String,
    token: String,
    verify_ssl: bool,
    timeout: Duration,
    filters: ImportFilters,
}

impl NetboxProvider {
    pub fn new(
        name: String,
        url: String,
        token: String,
        verify_ssl: bool,
        timeout: Duration,
        filters: ImportFilters,
    ) -> Self {
        Self {
            name,
            url: url.trim_end_matches('/').to_string(),
            token,
            verify_ssl,
            timeout,
            filters,
        }
    }

    /// API query parameters derived from the import filters
    #[cfg_attr(not(feature = "netbox"), allow(dead_code))]
    fn query(&self) -> Vec<(String, String)> {
        let mut query = vec![("limit".to_string(), "1000".to_string())];
        let named = [
            ("status", &self.filters.status),
            ("role", &self.filters.role),
            ("cluster", &self.filters.cluster),
        ];
        for (key, value) in named {
            if let Some(value) = value {
                query.push((key.to_string(), value.clone()));
            }
        }
        for tag in &self.filters.tags {
            query.push(("tag".to_string(), tag.clone()));
        }
        for (key, value) in &self.filters.extra {
            if FORWARDED_FILTERS.contains(&key.as_str()) {
                query.push((key.clone(), value.clone()));
            }
        }
        query
    }
}

#[cfg(feature = "netbox")]
impl NetboxProvider {
    async fn fetch_inner(&self) -> Result<Vec<Host>, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .danger_accept_invalid_certs(!self.verify_ssl)
            .build()?;

        let mut hosts = Vec::new();
        for (endpoint, object_type) in [
            ("/api/virtualization/virtual-machines/", "virtual_machine"),
            ("/api/dcim/devices/", "device"),
        ] {
            let objects = self.fetch_paginated(&client, endpoint).await?;
            tracing::debug!(
                "NetBox '{}': {} {} objects",
                self.name,
                objects.len(),
                object_type
            );
            hosts.extend(
                objects
                    .iter()
                    .filter_map(|object| object_to_host(object, object_type)),
            );
        }
        Ok(hosts)
    }

    async fn fetch_paginated(
        &self,
        client: &reqwest::Client,
        endpoint: &str,
    ) -> Result<Vec<serde_json::Value>, ProviderError> {
        let mut objects = Vec::new();
        let mut request = client
            .get(format!("{}{}", self.url, endpoint))
            .query(&self.query());

        loop {
            let response = request
                .header("Authorization", format!("Token {}", self.token))
                .header("Accept", "application/json")
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                return Err(ProviderError::Http(format!(
                    "{} returned {}",
                    endpoint, status
                )));
            }

            let page: serde_json::Value = response.json().await?;
            if let Some(results) = page.get("results").and_then(|r| r.as_array()) {
                objects.extend(results.iter().cloned());
            }

            match page.get("next").and_then(|n| n.as_str()) {
                Some(next) if !next.is_empty() => request = client.get(next),
                _ => break,
            }
        }
        Ok(objects)
    }
}

#[cfg(not(feature = "netbox"))]
impl NetboxProvider {
    async fn fetch_inner(&self) -> Result<Vec<Host>, ProviderError> {
        Err(ProviderError::DependencyMissing {
            provider: "NetBox",
            feature: "netbox",
        })
    }
}

/// Name of a nested NetBox object (`{"name": ..}`), a choice (`{"value": ..}`), or a plain string
#[cfg_attr(not(feature = "netbox"), allow(dead_code))]
fn display(value: Option<&serde_json::Value>) -> String {
    match value {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Object(map)) => ["name", "value", "label", "address"]
            .iter()
            .find_map(|key| map.get(*key).and_then(|v| v.as_str()))
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    }
}

#[cfg_attr(not(feature = "netbox"), allow(dead_code))]
fn primary_ip(object: &serde_json::Value) -> Option<String> {
    ["primary_ip4", "primary_ip6"]
        .iter()
        .map(|key| display(object.get(*key)))
        .find(|address| !address.is_empty())
        .map(|address| match address.split_once('/') {
            Some((ip, _prefix)) => ip.to_string(),
            None => address,
        })
}

#[cfg_attr(not(feature = "netbox"), allow(dead_code))]
fn object_to_host(object: &serde_json::Value, object_type: &str) -> Option<Host> {
    let name = display(object.get("name"));
    let Some(ip) = primary_ip(object) else {
        tracing::debug!("NetBox {} '{}' has no primary IP, skipping", object_type, name);
        return None;
    };

    // Devices used `device_role` before NetBox 4.0
    let role = match display(object.get("role")) {
        role if role.is_empty() => display(object.get("device_role")),
        role => role,
    };

    let tags: BTreeSet<String> = object
        .get("tags")
        .and_then(|t| t.as_array())
        .map(|tags| tags.iter().map(|t| display(Some(t))).filter(|t| !t.is_empty()).collect())
        .unwrap_or_default();

    let mut raw: BTreeMap<String, serde_json::Value> = BTreeMap::new();
    raw.insert("object_type".to_string(), object_type.into());
    for key in ["status", "platform", "site", "tenant", "rack"] {
        let value = display(object.get(key));
        if !value.is_empty() {
            raw.insert(key.to_string(), value.into());
        }
    }
    if let Some(id) = object.get("id") {
        raw.insert("netbox_id".to_string(), id.clone());
    }

    Some(Host {
        name,
        ip,
        description: display(object.get("description")),
        cluster: display(object.get("cluster")),
        role,
        tags,
        raw,
        ..Default::default()
    })
}

#[async_trait]
impl InventoryProvider for NetboxProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "netbox"
    }

    async fn fetch_hosts(&self) -> Result<Vec<Host>, ProviderError> {
        self.fetch_inner().await
    }
}
