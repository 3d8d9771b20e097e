//! Inventory Aggregator
//!
//! Runs provider adapters under bounded parallelism and merges their hosts.
//! A failing or slow provider never blocks the others: its error is collected
//! next to the hosts that did arrive.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{timeout, Instant};

use crate::config::{ProviderImport, SotConfig};
use crate::sot::{self, FetchResult, Host, InventoryProvider, ProviderError};

/// How providers are scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStrategy {
    /// At most `max_workers` providers in flight
    Parallel { max_workers: usize },
    /// One provider at a time, in import order
    Sequential,
}

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub strategy: FetchStrategy,
    /// Budget for a single provider
    pub timeout: Duration,
}

impl FetchOptions {
    pub fn from_config(config: &SotConfig) -> Self {
        let strategy = if config.parallel {
            FetchStrategy::Parallel {
                max_workers: config.max_workers,
            }
        } else {
            FetchStrategy::Sequential
        };
        Self {
            strategy,
            timeout: Duration::from_secs(config.fetch_timeout_secs),
        }
    }

    pub fn sequential(mut self) -> Self {
        self.strategy = FetchStrategy::Sequential;
        self
    }
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self::from_config(&SotConfig::default())
    }
}

/// A provider that failed during aggregation
#[derive(Debug, Clone, Serialize)]
pub struct ProviderFailure {
    pub provider: String,
    pub error: ProviderError,
}

/// Deduplicated union of every successful provider's hosts
#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregatedInventory {
    pub hosts: Vec<Host>,
    pub errors: Vec<ProviderFailure>,
}

impl AggregatedInventory {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    /// "N providers failed: ..." line for the UI, if anything failed
    pub fn failure_summary(&self) -> Option<String> {
        if self.errors.is_empty() {
            return None;
        }
        let details: Vec<String> = self
            .errors
            .iter()
            .map(|f| format!("{} ({})", f.provider, f.error))
            .collect();
        Some(format!(
            "{} provider{} failed: {}",
            self.errors.len(),
            if self.errors.len() == 1 { "" } else { "s" },
            details.join(", ")
        ))
    }
}

/// Fetch every import and merge the results
pub async fn fetch_all(imports: &[ProviderImport], options: &FetchOptions) -> AggregatedInventory {
    let providers: Vec<Arc<dyn InventoryProvider>> = imports.iter().map(sot::build_provider).collect();
    merge(fetch_providers(providers, options).await)
}

/// Run providers and return one [`FetchResult`] per provider, in input order
pub async fn fetch_providers(
    providers: Vec<Arc<dyn InventoryProvider>>,
    options: &FetchOptions,
) -> Vec<FetchResult> {
    let start = Instant::now();
    let count = providers.len();

    let results = match options.strategy {
        FetchStrategy::Parallel { max_workers } => {
            fetch_parallel(providers, max_workers.max(1), options.timeout).await
        }
        FetchStrategy::Sequential => {
            let mut results = Vec::with_capacity(count);
            for provider in providers {
                results.push(fetch_with_timeout(provider, options.timeout).await);
            }
            results
        }
    };

    tracing::info!(
        "Fetched {} providers in {:.2}s ({:?})",
        count,
        start.elapsed().as_secs_f64(),
        options.strategy
    );
    results
}

async fn fetch_parallel(
    providers: Vec<Arc<dyn InventoryProvider>>,
    max_workers: usize,
    budget: Duration,
) -> Vec<FetchResult> {
    let semaphore = Arc::new(Semaphore::new(max_workers));

    let handles: Vec<_> = providers
        .into_iter()
        .map(|provider| {
            let semaphore = semaphore.clone();
            let name = provider.name().to_string();
            let kind = provider.kind();
            let handle = tokio::spawn(async move {
                // Permit held for the whole fetch; excess providers queue here
                let _permit = semaphore.acquire_owned().await;
                fetch_with_timeout(provider, budget).await
            });
            (name, kind, handle)
        })
        .collect();

    // Join in spawn order so the merge is stable
    let mut results = Vec::with_capacity(handles.len());
    for (name, kind, handle) in handles {
        match handle.await {
            Ok(result) => results.push(result),
            Err(e) => {
                tracing::error!("Provider '{}' task failed: {}", name, e);
                results.push(FetchResult {
                    provider: name,
                    kind,
                    outcome: Err(ProviderError::Fetch(format!("provider task aborted: {}", e))),
                    elapsed: Duration::ZERO,
                });
            }
        }
    }
    results
}

async fn fetch_with_timeout(provider: Arc<dyn InventoryProvider>, budget: Duration) -> FetchResult {
    let start = Instant::now();
    match timeout(budget, sot::fetch(provider.as_ref())).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                "Provider '{}' timed out after {}s",
                provider.name(),
                budget.as_secs()
            );
            FetchResult {
                provider: provider.name().to_string(),
                kind: provider.kind(),
                outcome: Err(ProviderError::Timeout(budget.as_secs())),
                elapsed: start.elapsed(),
            }
        }
    }
}

/// Merge results in order. Hosts are deduplicated on the exact `(name, ip)`
/// pair; the first occurrence wins and keeps its provider tag.
pub fn merge(results: Vec<FetchResult>) -> AggregatedInventory {
    let mut inventory = AggregatedInventory::default();
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut dropped = 0usize;

    for result in results {
        match result.outcome {
            Ok(hosts) => {
                for host in hosts {
                    let (name, ip) = host.dedup_key();
                    if seen.insert((name.to_string(), ip.to_string())) {
                        inventory.hosts.push(host);
                    } else {
                        dropped += 1;
                    }
                }
            }
            Err(error) => inventory.errors.push(ProviderFailure {
                provider: result.provider,
                error,
            }),
        }
    }

    if dropped > 0 {
        tracing::debug!("Dropped {} duplicate hosts", dropped);
    }
    inventory
}
