//! SSHplex - multiplexed SSH sessions over an aggregated host inventory
//!
//! Hosts are gathered from several sources of truth, cached, resolved to ssh
//! targets and opened as panes of one tmux session.

pub mod aggregator;
pub mod cache;
pub mod commands;
pub mod config;
pub mod retry;
pub mod session;
pub mod sot;
pub mod ssh;

use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::LoggingConfig;

/// Level used on stderr when file logging is off
const QUIET_LEVEL: &str = "warn";

/// Map a configured level name onto an `EnvFilter` directive
fn filter_directive(level: &str) -> &'static str {
    match level.to_ascii_uppercase().as_str() {
        "DEBUG" => "debug",
        "WARNING" | "WARN" => "warn",
        "ERROR" => "error",
        _ => "info",
    }
}

/// Initialize logging
///
/// `RUST_LOG` always wins over the configured level. With `logging.enabled`
/// and a file set, events go to that file; otherwise warnings and errors go
/// to stderr.
pub fn init_logging(config: &LoggingConfig) -> std::io::Result<()> {
    let to_file = config.enabled && !config.file.is_empty();
    let default_level = if config.enabled {
        filter_directive(&config.level)
    } else {
        QUIET_LEVEL
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file_layer = if to_file {
        let path = std::path::Path::new(&config.file);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Some(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
    } else {
        None
    };
    let stderr_layer = if to_file {
        None
    } else {
        Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();
    Ok(())
}
