//! Static host list provider

use async_trait::async_trait;

use super::filters::{compile_pattern, has_any_tag};
use super::{Host, InventoryProvider, ProviderError};
use crate::config::{ImportFilters, StaticHostEntry};

/// Hosts declared inline in the configuration
pub struct StaticProvider {
    name: String,
    hosts: Vec<StaticHostEntry>,
    filters: ImportFilters,
}

impl StaticProvider {
    pub fn new(name: String, hosts: Vec<StaticHostEntry>, filters: ImportFilters) -> Self {
        Self {
            name,
            hosts,
            filters,
        }
    }
}

impl From<&StaticHostEntry> for Host {
    fn from(entry: &StaticHostEntry) -> Self {
        Host {
            name: entry.name.clone(),
            ip: entry.ip.clone(),
            description: entry.description.clone(),
            cluster: entry.cluster.clone(),
            role: entry.role.clone(),
            tags: entry.tags.iter().cloned().collect(),
            provider_name: String::new(),
            ssh_user: entry.username.clone().filter(|u| !u.is_empty()),
            ssh_port: entry.port,
            raw: entry.extra.clone(),
        }
    }
}

#[async_trait]
impl InventoryProvider for StaticProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "static"
    }

    async fn fetch_hosts(&self) -> Result<Vec<Host>, ProviderError> {
        let name_re = compile_pattern("name_pattern", self.filters.name_pattern.as_deref())?;
        let description_re = compile_pattern(
            "description_pattern",
            self.filters.description_pattern.as_deref(),
        )?;

        let hosts: Vec<Host> = self
            .hosts
            .iter()
            .map(Host::from)
            .filter(|host| has_any_tag(host, &self.filters.tags))
            .filter(|host| name_re.as_ref().map_or(true, |re| re.is_match(&host.name)))
            .filter(|host| {
                description_re
                    .as_ref()
                    .map_or(true, |re| re.is_match(&host.description))
            })
            .collect();

        tracing::debug!(
            "Static provider '{}': {} of {} hosts after filtering",
            self.name,
            hosts.len(),
            self.hosts.len()
        );
        Ok(hosts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries() -> Vec<StaticHostEntry> {
        serde_yaml::from_str(
            r#"
- name: web-01
  ip: 192.168.1.10
  description: Frontend web
  tags: [web, prod]
  username: deploy
  port: 2222
- name: db-01
  ip: 192.168.1.20
  description: Primary database
  tags: [db, prod]
  rack: r12
- name: web-02
  ip: 192.168.1.11
  description: Staging web
  tags: [web, staging]
"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_no_filters_returns_all() {
        let provider = StaticProvider::new("lab".into(), entries(), ImportFilters::default());
        let hosts = provider.fetch_hosts().await.unwrap();

        assert_eq!(hosts.len(), 3);
        assert_eq!(hosts[0].ssh_user.as_deref(), Some("deploy"));
        assert_eq!(hosts[0].ssh_port, Some(2222));
        assert_eq!(hosts[1].raw_str("rack"), Some("r12"));
    }

    #[tokio::test]
    async fn test_tag_filter() {
        let filters = ImportFilters {
            tags: vec!["web".into()],
            ..Default::default()
        };
        let provider = StaticProvider::new("lab".into(), entries(), filters);
        let names: Vec<String> = provider
            .fetch_hosts()
            .await
            .unwrap()
            .into_iter()
            .map(|h| h.name)
            .collect();

        assert_eq!(names, vec!["web-01", "web-02"]);
    }

    #[tokio::test]
    async fn test_pattern_filters() {
        let filters = ImportFilters {
            name_pattern: Some("^web-".into()),
            description_pattern: Some("(?i)staging".into()),
            ..Default::default()
        };
        let provider = StaticProvider::new("lab".into(), entries(), filters);
        let hosts = provider.fetch_hosts().await.unwrap();

        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].name, "web-02");
    }

    #[tokio::test]
    async fn test_invalid_pattern_is_error() {
        let filters = ImportFilters {
            name_pattern: Some("(".into()),
            ..Default::default()
        };
        let provider = StaticProvider::new("lab".into(), entries(), filters);
        let err = provider.fetch_hosts().await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidFilter { .. }));
    }
}
