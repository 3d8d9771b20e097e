//! Configuration Types
//!
//! Typed view of `sshplex.yaml`. Every section has serde defaults so a minimal
//! file only needs the provider imports.

use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sshplex: GeneralConfig,

    /// Sources of truth
    #[serde(default)]
    pub sot: SotConfig,

    #[serde(default)]
    pub ssh: SshSettings,

    #[serde(default)]
    pub tmux: TmuxConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Prefix for generated tmux session names
    #[serde(default = "default_session_prefix")]
    pub session_prefix: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            session_prefix: default_session_prefix(),
        }
    }
}

/// Inventory provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SotConfig {
    /// Provider imports, fetched and merged in this order
    #[serde(rename = "import", default)]
    pub imports: Vec<ProviderImport>,

    /// Maximum number of providers fetched at the same time
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Fetch providers concurrently (false = one after another)
    #[serde(default = "default_true")]
    pub parallel: bool,

    /// Per-provider fetch budget in seconds
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

impl Default for SotConfig {
    fn default() -> Self {
        Self {
            imports: Vec::new(),
            max_workers: default_max_workers(),
            parallel: true,
            fetch_timeout_secs: default_fetch_timeout(),
        }
    }
}

/// A single inventory import
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderImport {
    /// Unique logical name, stamped on every host it produces
    pub name: String,

    /// Type-specific connection parameters (`type: static|netbox|ansible|consul`)
    #[serde(flatten)]
    pub source: ProviderSource,

    /// Inclusion/exclusion rules applied by the adapter
    #[serde(default, alias = "default_filters")]
    pub filters: ImportFilters,
}

impl ProviderImport {
    pub fn kind(&self) -> &'static str {
        self.source.kind()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderSource {
    Static {
        #[serde(default)]
        hosts: Vec<StaticHostEntry>,
    },
    Netbox {
        url: String,
        token: String,
        #[serde(default = "default_true")]
        verify_ssl: bool,
        #[serde(default = "default_http_timeout")]
        timeout: u64,
    },
    Ansible {
        #[serde(default)]
        inventory_paths: Vec<String>,
    },
    Consul {
        #[serde(default)]
        config: ConsulSettings,
    },
}

impl ProviderSource {
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderSource::Static { .. } => "static",
            ProviderSource::Netbox { .. } => "netbox",
            ProviderSource::Ansible { .. } => "ansible",
            ProviderSource::Consul { .. } => "consul",
        }
    }
}

/// A host declared inline in a static import
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticHostEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub cluster: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Per-host SSH user override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Per-host SSH port override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u32>,
    /// Anything else, kept verbatim as host metadata
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsulSettings {
    #[serde(default = "default_consul_host")]
    pub host: String,
    #[serde(default = "default_consul_port")]
    pub port: u16,
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_consul_scheme")]
    pub scheme: String,
    #[serde(default = "default_true")]
    pub verify: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dc: Option<String>,
    #[serde(default = "default_http_timeout")]
    pub timeout: u64,
}

impl Default for ConsulSettings {
    fn default() -> Self {
        Self {
            host: default_consul_host(),
            port: default_consul_port(),
            token: String::new(),
            scheme: default_consul_scheme(),
            verify: true,
            dc: None,
            timeout: default_http_timeout(),
        }
    }
}

/// Adapter-side filters. Each adapter reads the keys that make sense for it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportFilters {
    /// Keep hosts carrying any of these tags
    #[serde(default, deserialize_with = "string_or_list")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_pattern: Option<String>,
    /// Ansible: keep hosts of these groups
    #[serde(default, deserialize_with = "string_or_list")]
    pub groups: Vec<String>,
    /// Ansible: drop hosts of these groups
    #[serde(default, deserialize_with = "string_or_list")]
    pub exclude_groups: Vec<String>,
    /// Ansible: host name regexes
    #[serde(default, deserialize_with = "string_or_list")]
    pub host_patterns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    /// Provider-specific keys (NetBox query parameters, Consul meta equality)
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl ImportFilters {
    pub fn is_empty(&self) -> bool {
        *self == ImportFilters::default()
    }
}

fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::One(value)) => vec![value],
        Some(OneOrMany::Many(values)) => values,
        None => Vec::new(),
    })
}

/// SSH defaults applied to every host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshSettings {
    #[serde(default = "default_username")]
    pub username: String,

    #[serde(default = "default_key_path")]
    pub key_path: String,

    /// ConnectTimeout in seconds
    #[serde(default = "default_ssh_timeout")]
    pub timeout: u64,

    /// Kept wider than u16 so out-of-range values reach target validation
    #[serde(default = "default_port")]
    pub port: u32,

    /// - true: `StrictHostKeyChecking=yes`
    /// - false: `StrictHostKeyChecking=accept-new`
    #[serde(default)]
    pub strict_host_key_checking: bool,

    /// Empty means the ssh client default (~/.ssh/known_hosts)
    #[serde(default)]
    pub user_known_hosts_file: String,

    /// Probe each host with a non-interactive ssh before launching its pane
    #[serde(default)]
    pub preflight: bool,

    #[serde(default)]
    pub retry: RetryPolicy,

    /// Jump host routes keyed by provider import name
    #[serde(default)]
    pub proxy: Vec<ProxyRoute>,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            username: default_username(),
            key_path: default_key_path(),
            timeout: default_ssh_timeout(),
            port: default_port(),
            strict_host_key_checking: false,
            user_known_hosts_file: String::new(),
            preflight: false,
            retry: RetryPolicy::default(),
            proxy: Vec::new(),
        }
    }
}

/// Connection retry policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay")]
    pub delay_seconds: f64,
    #[serde(default = "default_true")]
    pub exponential_backoff: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: default_max_attempts(),
            delay_seconds: default_retry_delay(),
            exponential_backoff: true,
        }
    }
}

/// Routes hosts of the listed imports through a jump host
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProxyRoute {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub imports: Vec<String>,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub key_path: String,
    #[serde(default = "default_port")]
    pub port: u32,
}

/// tmux layout algorithms applied after each split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaneLayout {
    #[default]
    Tiled,
    EvenHorizontal,
    EvenVertical,
    MainHorizontal,
    MainVertical,
}

impl PaneLayout {
    pub fn as_tmux(&self) -> &'static str {
        match self {
            PaneLayout::Tiled => "tiled",
            PaneLayout::EvenHorizontal => "even-horizontal",
            PaneLayout::EvenVertical => "even-vertical",
            PaneLayout::MainHorizontal => "main-horizontal",
            PaneLayout::MainVertical => "main-vertical",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TmuxConfig {
    #[serde(default)]
    pub layout: PaneLayout,

    /// Default broadcast toggle offered to the selection UI
    #[serde(default)]
    pub broadcast: bool,

    #[serde(default = "default_window_name")]
    pub window_name: String,

    #[serde(default = "default_max_panes")]
    pub max_panes_per_window: usize,

    /// Drive iTerm2 native tabs/splits through tmux control mode (macOS)
    #[serde(default)]
    pub control_with_iterm2: bool,
}

impl Default for TmuxConfig {
    fn default() -> Self {
        Self {
            layout: PaneLayout::Tiled,
            broadcast: false,
            window_name: default_window_name(),
            max_panes_per_window: default_max_panes(),
            control_with_iterm2: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_dir: default_cache_dir(),
            ttl_hours: default_ttl_hours(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_file")]
    pub file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

const LOG_LEVELS: &[&str] = &["DEBUG", "INFO", "WARNING", "ERROR"];

impl Config {
    /// Deterministic hash of the provider imports.
    ///
    /// Any edit to an import (URL, token, filters, inline hosts) changes it,
    /// which invalidates a cached inventory built from the old imports.
    pub fn provider_fingerprint(&self) -> String {
        let canonical = serde_json::to_vec(&self.sot.imports).unwrap_or_default();
        let digest = Sha256::digest(&canonical);
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Check cross-field rules serde cannot express.
    /// Returns every problem found, not just the first.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        let mut seen: HashMap<&str, usize> = HashMap::new();
        for import in &self.sot.imports {
            if import.name.trim().is_empty() {
                problems.push(format!("sot.import: a {} import has an empty name", import.kind()));
                continue;
            }
            *seen.entry(import.name.as_str()).or_default() += 1;

            match &import.source {
                ProviderSource::Netbox { url, token, .. } => {
                    if !url.starts_with("http://") && !url.starts_with("https://") {
                        problems.push(format!(
                            "sot.import '{}': NetBox URL must start with http:// or https://",
                            import.name
                        ));
                    }
                    if token.is_empty() {
                        problems.push(format!("sot.import '{}': NetBox token is empty", import.name));
                    }
                }
                ProviderSource::Ansible { inventory_paths } if inventory_paths.is_empty() => {
                    problems.push(format!(
                        "sot.import '{}': at least one inventory path is required",
                        import.name
                    ));
                }
                _ => {}
            }
        }
        let mut duplicates: Vec<&str> = seen
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(name, _)| name)
            .collect();
        duplicates.sort_unstable();
        for name in duplicates {
            problems.push(format!("sot.import: duplicate import name '{}'", name));
        }

        if self.sot.max_workers == 0 {
            problems.push("sot.max_workers must be at least 1".to_string());
        }

        let retry = &self.ssh.retry;
        if !(1..=10).contains(&retry.max_attempts) {
            problems.push(format!(
                "ssh.retry.max_attempts must be between 1 and 10 (got {})",
                retry.max_attempts
            ));
        }
        if !(0.0..=60.0).contains(&retry.delay_seconds) {
            problems.push(format!(
                "ssh.retry.delay_seconds must be between 0 and 60 (got {})",
                retry.delay_seconds
            ));
        }

        // One import may be claimed by one route only
        let mut claimed: HashMap<&str, &str> = HashMap::new();
        for route in &self.ssh.proxy {
            for import in &route.imports {
                if let Some(previous) = claimed.insert(import.as_str(), route.name.as_str()) {
                    if previous != route.name {
                        problems.push(format!(
                            "ssh.proxy: import '{}' is routed through both '{}' and '{}'",
                            import, previous, route.name
                        ));
                    }
                }
            }
        }

        if self.tmux.max_panes_per_window == 0 {
            problems.push("tmux.max_panes_per_window must be at least 1".to_string());
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_uppercase().as_str()) {
            problems.push(format!(
                "logging.level must be one of {:?} (got '{}')",
                LOG_LEVELS, self.logging.level
            ));
        }

        problems
    }
}

fn default_true() -> bool {
    true
}

fn default_session_prefix() -> String {
    "sshplex".to_string()
}

fn default_max_workers() -> usize {
    4
}

fn default_fetch_timeout() -> u64 {
    30
}

fn default_http_timeout() -> u64 {
    30
}

fn default_consul_host() -> String {
    "localhost".to_string()
}

fn default_consul_port() -> u16 {
    8500
}

fn default_consul_scheme() -> String {
    "http".to_string()
}

fn default_username() -> String {
    "admin".to_string()
}

fn default_key_path() -> String {
    "~/.ssh/id_rsa".to_string()
}

fn default_ssh_timeout() -> u64 {
    10
}

fn default_port() -> u32 {
    22
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay() -> f64 {
    2.0
}

fn default_window_name() -> String {
    "sshplex".to_string()
}

fn default_max_panes() -> usize {
    5
}

fn default_cache_dir() -> String {
    "~/.cache/sshplex".to_string()
}

fn default_ttl_hours() -> u64 {
    24
}

fn default_log_level() -> String {
    "INFO".to_string()
}

fn default_log_file() -> String {
    "logs/sshplex.log".to_string()
}
