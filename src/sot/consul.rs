//! Consul catalog provider

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};

use super::filters::has_any_tag;
use super::{Host, InventoryProvider, ProviderError};
use crate::config::{ConsulSettings, ImportFilters};

#[cfg_attr(not(feature = "consul"), allow(dead_code))]
pub struct ConsulProvider {
    name: String,
    settings: ConsulSettings,
    filters: ImportFilters,
}

/// One entry of `/v1/catalog/nodes`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
#[cfg_attr(not(feature = "consul"), allow(dead_code))]
struct CatalogNode {
    node: String,
    address: String,
    #[serde(default)]
    datacenter: String,
    #[serde(default)]
    meta: Option<BTreeMap<String, String>>,
}

impl CatalogNode {
    #[cfg_attr(not(feature = "consul"), allow(dead_code))]
    fn into_host(self) -> Host {
        let meta = self.meta.unwrap_or_default();
        let tags: BTreeSet<String> = meta
            .get("tags")
            .map(|t| {
                t.split(',')
                    .map(|tag| tag.trim().to_string())
                    .filter(|tag| !tag.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let field = |key: &str| meta.get(key).cloned().unwrap_or_default();
        let mut host = Host {
            name: self.node,
            ip: self.address,
            description: field("description"),
            cluster: field("cluster"),
            role: field("role"),
            tags,
            ..Default::default()
        };

        host.raw = meta
            .into_iter()
            .map(|(k, v)| (k, serde_json::Value::String(v)))
            .collect();
        if !self.datacenter.is_empty() {
            host.raw
                .insert("datacenter".to_string(), self.datacenter.into());
        }
        host
    }
}

impl ConsulProvider {
    pub fn new(name: String, settings: ConsulSettings, filters: ImportFilters) -> Self {
        Self {
            name,
            settings,
            filters,
        }
    }

    #[cfg_attr(not(feature = "consul"), allow(dead_code))]
    fn base_url(&self) -> String {
        format!(
            "{}://{}:{}",
            self.settings.scheme, self.settings.host, self.settings.port
        )
    }

    /// Equality predicates: every non-standard filter key compared against node meta
    #[cfg_attr(not(feature = "consul"), allow(dead_code))]
    fn meta_predicates(&self) -> Vec<(&str, &str)> {
        let mut predicates: Vec<(&str, &str)> = [
            ("status", &self.filters.status),
            ("role", &self.filters.role),
            ("cluster", &self.filters.cluster),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.as_deref().map(|v| (key, v)))
        .collect();
        predicates.extend(
            self.filters
                .extra
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str())),
        );
        predicates
    }

    #[cfg_attr(not(feature = "consul"), allow(dead_code))]
    fn apply_filters(&self, hosts: Vec<Host>) -> Result<Vec<Host>, ProviderError> {
        let name_pattern = match self.filters.name_pattern.as_deref() {
            Some(p) if !p.is_empty() => {
                Some(glob::Pattern::new(p).map_err(|e| ProviderError::InvalidFilter {
                    filter: "name_pattern".to_string(),
                    message: e.to_string(),
                })?)
            }
            _ => None,
        };
        let predicates = self.meta_predicates();

        Ok(hosts
            .into_iter()
            .filter(|h| name_pattern.as_ref().map_or(true, |p| p.matches(&h.name)))
            .filter(|h| has_any_tag(h, &self.filters.tags))
            .filter(|h| {
                predicates
                    .iter()
                    .all(|(key, value)| h.raw_str(key) == Some(*value))
            })
            .collect())
    }
}

#[cfg(feature = "consul")]
impl ConsulProvider {
    async fn fetch_inner(&self) -> Result<Vec<Host>, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(self.settings.timeout))
            .danger_accept_invalid_certs(!self.settings.verify)
            .build()?;

        let mut request = client.get(format!("{}/v1/catalog/nodes", self.base_url()));
        if let Some(dc) = self.settings.dc.as_deref().filter(|dc| !dc.is_empty()) {
            request = request.query(&[("dc", dc)]);
        }
        if !self.settings.token.is_empty() {
            request = request.header("X-Consul-Token", &self.settings.token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Http(format!(
                "/v1/catalog/nodes returned {}",
                status
            )));
        }

        let nodes: Vec<CatalogNode> = response.json().await?;
        let total = nodes.len();
        let hosts = self.apply_filters(nodes.into_iter().map(CatalogNode::into_host).collect())?;
        tracing::debug!(
            "Consul '{}': {} of {} catalog nodes kept",
            self.name,
            hosts.len(),
            total
        );
        Ok(hosts)
    }
}

#[cfg(not(feature = "consul"))]
impl ConsulProvider {
    async fn fetch_inner(&self) -> Result<Vec<Host>, ProviderError> {
        Err(ProviderError::DependencyMissing {
            provider: "Consul",
            feature: "consul",
        })
    }
}

#[async_trait]
impl InventoryProvider for ConsulProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "consul"
    }

    async fn fetch_hosts(&self) -> Result<Vec<Host>, ProviderError> {
        self.fetch_inner().await
    }
}

#[cfg(all(test, feature = "consul"))]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn server_with_nodes() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/catalog/nodes"))
            .and(query_param("dc", "dc1"))
            .and(header("X-Consul-Token", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"Node": "web-01", "Address": "10.0.0.1", "Datacenter": "dc1",
                 "Meta": {"tags": "web, prod", "env": "prod", "role": "frontend"}},
                {"Node": "web-02", "Address": "10.0.0.2", "Datacenter": "dc1",
                 "Meta": {"tags": "web", "env": "staging"}},
                {"Node": "db-01", "Address": "10.0.0.3", "Datacenter": "dc1", "Meta": null}
            ])))
            .mount(&server)
            .await;
        server
    }

    fn provider(server: &MockServer, filters: ImportFilters) -> ConsulProvider {
        let address = server.address();
        let settings = ConsulSettings {
            host: address.ip().to_string(),
            port: address.port(),
            token: "secret".into(),
            dc: Some("dc1".into()),
            ..Default::default()
        };
        ConsulProvider::new("consul-dc1".into(), settings, filters)
    }

    #[tokio::test]
    async fn test_catalog_nodes_mapped() {
        let server = server_with_nodes().await;
        let hosts = provider(&server, ImportFilters::default())
            .fetch_hosts()
            .await
            .unwrap();

        assert_eq!(hosts.len(), 3);
        assert_eq!(hosts[0].name, "web-01");
        assert_eq!(hosts[0].ip, "10.0.0.1");
        assert_eq!(hosts[0].role, "frontend");
        assert!(hosts[0].tags.contains("prod"));
        assert_eq!(hosts[0].raw_str("env"), Some("prod"));
        assert_eq!(hosts[2].raw_str("datacenter"), Some("dc1"));
    }

    #[tokio::test]
    async fn test_filters() {
        let server = server_with_nodes().await;

        let mut filters = ImportFilters {
            name_pattern: Some("web-*".into()),
            ..Default::default()
        };
        filters.extra.insert("env".into(), "staging".into());
        let hosts = provider(&server, filters).fetch_hosts().await.unwrap();
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].name, "web-02");

        let filters = ImportFilters {
            tags: vec!["prod".into()],
            ..Default::default()
        };
        let hosts = provider(&server, filters).fetch_hosts().await.unwrap();
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].name, "web-01");
    }

    #[tokio::test]
    async fn test_unreachable_agent_is_error() {
        let settings = ConsulSettings {
            host: "127.0.0.1".into(),
            port: 1,
            timeout: 2,
            ..Default::default()
        };
        let err = ConsulProvider::new("down".into(), settings, ImportFilters::default())
            .fetch_hosts()
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Http(_)));
    }
}
