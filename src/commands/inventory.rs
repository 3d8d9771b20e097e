//! Inventory Commands
//!
//! Host fetching (cache first), per-provider diagnostics, cache management
//! and provider listing.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::aggregator::{self, AggregatedInventory, FetchOptions};
use crate::cache::{CacheError, CacheLookup, HostCache};
use crate::config::{Config, ProviderSource};
use crate::sot;

/// Hosts for the selection UI
#[derive(Debug, Clone, Serialize)]
pub struct InventoryResponse {
    pub inventory: AggregatedInventory,
    pub from_cache: bool,
    /// When the hosts were fetched from their providers
    pub fetched_at: DateTime<Utc>,
}

/// Return the inventory, from the cache when it is valid and `use_cache`
/// is set, otherwise from the providers.
///
/// Only a complete fetch is written back to the cache. Cache problems are
/// logged and never fail the request.
pub async fn fetch_hosts(config: &Config, cache: &HostCache, use_cache: bool) -> InventoryResponse {
    let fingerprint = config.provider_fingerprint();
    let caching = config.cache.enabled;

    if caching && use_cache {
        match cache.load(&fingerprint) {
            Ok(CacheLookup::Hit(entry)) => {
                return InventoryResponse {
                    inventory: AggregatedInventory {
                        hosts: entry.hosts,
                        errors: Vec::new(),
                    },
                    from_cache: true,
                    fetched_at: entry.fetched_at,
                };
            }
            Ok(CacheLookup::Miss(reason)) => {
                tracing::debug!("Cache miss ({:?}), fetching from providers", reason)
            }
            Err(e) => tracing::warn!("Cache unreadable, fetching from providers: {}", e),
        }
    }

    let options = FetchOptions::from_config(&config.sot);
    let inventory = aggregator::fetch_all(&config.sot.imports, &options).await;
    let fetched_at = Utc::now();

    if let Some(summary) = inventory.failure_summary() {
        tracing::warn!("{}", summary);
    }

    if caching {
        if inventory.is_complete() {
            let names = config.sot.imports.iter().map(|i| i.name.clone()).collect();
            if let Err(e) = cache.save(&fingerprint, names, &inventory.hosts) {
                tracing::warn!("Failed to write host cache: {}", e);
            }
        } else {
            tracing::info!("Not caching a partial inventory");
        }
    }

    InventoryResponse {
        inventory,
        from_cache: false,
        fetched_at,
    }
}

/// One provider's line in the debug report
#[derive(Debug, Clone, Serialize)]
pub struct ProviderReport {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub elapsed_ms: u128,
    pub host_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The provider's optional capability is not compiled in
    pub dependency_missing: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FetchReport {
    pub providers: Vec<ProviderReport>,
    /// Hosts after merging and deduplication
    pub merged_hosts: usize,
    pub elapsed_ms: u128,
}

impl FetchReport {
    pub fn failed(&self) -> usize {
        self.providers.iter().filter(|p| p.error.is_some()).count()
    }
}

/// Fetch every provider and report timings. Never reads or writes the cache.
pub async fn debug_fetch(config: &Config) -> FetchReport {
    debug_fetch_with(config, &FetchOptions::from_config(&config.sot)).await
}

pub async fn debug_fetch_with(config: &Config, options: &FetchOptions) -> FetchReport {
    let start = tokio::time::Instant::now();
    let providers = config.sot.imports.iter().map(sot::build_provider).collect();
    let results = aggregator::fetch_providers(providers, options).await;

    let reports = results
        .iter()
        .map(|r| {
            let error = r.outcome.as_ref().err();
            ProviderReport {
                name: r.provider.clone(),
                kind: r.kind,
                elapsed_ms: r.elapsed.as_millis(),
                host_count: r.host_count(),
                error: error.map(|e| e.to_string()),
                dependency_missing: error.map(|e| e.is_dependency_missing()).unwrap_or(false),
            }
        })
        .collect();

    let merged = aggregator::merge(results);
    FetchReport {
        providers: reports,
        merged_hosts: merged.hosts.len(),
        elapsed_ms: start.elapsed().as_millis(),
    }
}

/// Remove the cache file; returns whether one existed
pub fn clear_cache(cache: &HostCache) -> Result<bool, CacheError> {
    cache.invalidate()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderSummary {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Endpoint, inventory paths or host count
    pub source: String,
    pub filtered: bool,
}

pub fn list_providers(config: &Config) -> Vec<ProviderSummary> {
    config
        .sot
        .imports
        .iter()
        .map(|import| {
            let source = match &import.source {
                ProviderSource::Static { hosts } => format!("{} hosts", hosts.len()),
                ProviderSource::Netbox { url, .. } => url.clone(),
                ProviderSource::Ansible { inventory_paths } => inventory_paths.join(", "),
                ProviderSource::Consul { config } => {
                    let endpoint = format!("{}://{}:{}", config.scheme, config.host, config.port);
                    match &config.dc {
                        Some(dc) => format!("{} (dc {})", endpoint, dc),
                        None => endpoint,
                    }
                }
            };
            ProviderSummary {
                name: import.name.clone(),
                kind: import.kind(),
                source,
                filtered: !import.filters.is_empty(),
            }
        })
        .collect()
}
