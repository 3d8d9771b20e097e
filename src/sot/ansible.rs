//! Ansible YAML inventory provider
//!
//! Reads one or more YAML inventories rooted at `all`, walking `children`
//! to any depth. A host listed in several groups or files becomes one host
//! whose variables are the union of every occurrence.

use async_trait::async_trait;
use serde_yaml::{Mapping, Value};
use std::collections::HashMap;

use super::filters::compile_patterns;
use super::{Host, InventoryProvider, ProviderError};
use crate::config::ImportFilters;

pub struct AnsibleProvider {
    name: String,
    inventory_paths: Vec<String>,
    filters: ImportFilters,
}

/// A host as seen while walking the inventories, before normalization
#[derive(Debug, Default)]
struct InventoryHost {
    name: String,
    vars: Mapping,
    /// Every group on the path to each occurrence, outermost first
    groups: Vec<String>,
    /// Group whose `hosts` block first listed the host
    group: String,
    source: String,
}

#[derive(Default)]
struct Collector {
    hosts: Vec<InventoryHost>,
    index: HashMap<String, usize>,
}

impl Collector {
    fn walk(&mut self, group: &str, node: &Value, path: &mut Vec<String>, source: &str) {
        path.push(group.to_string());

        if let Some(hosts) = node.get("hosts").and_then(Value::as_mapping) {
            for (key, vars) in hosts {
                let Some(name) = scalar_to_string(key) else {
                    continue;
                };
                self.add(name, vars, group, path, source);
            }
        }

        if let Some(children) = node.get("children").and_then(Value::as_mapping) {
            for (key, child) in children {
                if let Some(child_name) = scalar_to_string(key) {
                    self.walk(&child_name, child, path, source);
                }
            }
        }

        path.pop();
    }

    fn add(&mut self, name: String, vars: &Value, group: &str, path: &[String], source: &str) {
        let idx = match self.index.get(&name) {
            Some(idx) => *idx,
            None => {
                self.index.insert(name.clone(), self.hosts.len());
                self.hosts.push(InventoryHost {
                    name,
                    group: group.to_string(),
                    source: source.to_string(),
                    ..Default::default()
                });
                self.hosts.len() - 1
            }
        };

        let host = &mut self.hosts[idx];
        if let Some(vars) = vars.as_mapping() {
            for (k, v) in vars {
                host.vars.insert(k.clone(), v.clone());
            }
        }
        for g in path {
            if !host.groups.contains(g) {
                host.groups.push(g.clone());
            }
        }
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn var<'a>(vars: &'a Mapping, key: &str) -> Option<&'a Value> {
    vars.get(key)
}

impl InventoryHost {
    fn into_host(self) -> Option<Host> {
        let ip = var(&self.vars, "ansible_host").and_then(scalar_to_string)?;

        let ssh_user = var(&self.vars, "ansible_user").and_then(scalar_to_string);
        let ssh_port = var(&self.vars, "ansible_port")
            .and_then(scalar_to_string)
            .and_then(|p| p.parse::<u32>().ok());
        let description = var(&self.vars, "description")
            .and_then(scalar_to_string)
            .unwrap_or_default();

        let mut raw = std::collections::BTreeMap::new();
        for (k, v) in &self.vars {
            if let (Some(key), Ok(value)) = (scalar_to_string(k), serde_json::to_value(v)) {
                raw.insert(key, value);
            }
        }
        raw.insert("ansible_group".to_string(), self.group.clone().into());
        raw.insert("ansible_groups".to_string(), self.groups.clone().into());
        raw.insert("source".to_string(), self.source.into());

        Some(Host {
            name: self.name,
            ip,
            description,
            role: self.group,
            tags: self.groups.into_iter().filter(|g| g != "all").collect(),
            ssh_user,
            ssh_port,
            raw,
            ..Default::default()
        })
    }
}

impl AnsibleProvider {
    pub fn new(name: String, inventory_paths: Vec<String>, filters: ImportFilters) -> Self {
        Self {
            name,
            inventory_paths,
            filters,
        }
    }

    async fn load(&self, path: &str, collector: &mut Collector) -> Result<(), ProviderError> {
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            ProviderError::Inventory(format!("cannot read inventory {}: {}", path, e))
        })?;
        let doc: Value = serde_yaml::from_str(&contents)
            .map_err(|e| ProviderError::Inventory(format!("invalid YAML in {}: {}", path, e)))?;

        let all = doc
            .get("all")
            .ok_or_else(|| ProviderError::Inventory(format!("no 'all' group in {}", path)))?;

        let mut group_path = Vec::new();
        collector.walk("all", all, &mut group_path, path);
        tracing::debug!("Loaded Ansible inventory {}", path);
        Ok(())
    }

    fn keep(&self, host: &InventoryHost, host_patterns: &[regex::Regex]) -> bool {
        let filters = &self.filters;
        if !filters.groups.is_empty() && !filters.groups.iter().any(|g| host.groups.contains(g)) {
            return false;
        }
        if filters.exclude_groups.iter().any(|g| host.groups.contains(g)) {
            return false;
        }
        host_patterns.is_empty() || host_patterns.iter().any(|re| re.is_match(&host.name))
    }
}

#[async_trait]
impl InventoryProvider for AnsibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "ansible"
    }

    async fn fetch_hosts(&self) -> Result<Vec<Host>, ProviderError> {
        if self.inventory_paths.is_empty() {
            return Err(ProviderError::Inventory("no inventory paths configured".to_string()));
        }
        let host_patterns = compile_patterns("host_patterns", &self.filters.host_patterns)?;

        let mut collector = Collector::default();
        for path in &self.inventory_paths {
            self.load(path, &mut collector).await?;
        }

        let total = collector.hosts.len();
        let hosts: Vec<Host> = collector
            .hosts
            .into_iter()
            .filter(|h| self.keep(h, &host_patterns))
            .filter_map(|h| {
                let name = h.name.clone();
                let host = h.into_host();
                if host.is_none() {
                    tracing::debug!("Ansible host '{}' has no ansible_host, skipping", name);
                }
                host
            })
            .collect();

        tracing::debug!(
            "Ansible provider '{}': {} of {} hosts kept",
            self.name,
            hosts.len(),
            total
        );
        Ok(hosts)
    }
}
