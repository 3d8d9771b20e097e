//! Configuration Module
//!
//! Typed `sshplex.yaml` configuration, defaults, validation and loading.

mod storage;
mod types;

pub use storage::{
    config_dir, default_config_path, expand_tilde, load_config, log_dir, parse_config,
    ConfigError,
};
pub use types::{
    CacheConfig, Config, ConsulSettings, GeneralConfig, ImportFilters, LoggingConfig, PaneLayout,
    ProviderImport, ProviderSource, ProxyRoute, RetryPolicy, SotConfig, SshSettings,
    StaticHostEntry, TmuxConfig,
};
