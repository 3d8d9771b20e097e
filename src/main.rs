use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use sshplex::aggregator::FetchOptions;
use sshplex::cache::HostCache;
use sshplex::commands;
use sshplex::config::{load_config, Config};
use sshplex::session::{
    AttachOutcome, PaneStatus, SessionError, SessionMode, SessionReport, SessionRequest,
};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// SSHplex - open tmux sessions to hosts from multiple inventories
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (default: ~/.config/sshplex/sshplex.yaml)
    #[arg(short, long, global = true, env = "SSHPLEX_CONFIG")]
    config: Option<PathBuf>,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List configured inventory providers
    ListProviders,

    /// Fetch every provider and report timings, bypassing the cache
    Debug {
        /// Fetch providers one after another
        #[arg(long)]
        sequential: bool,
    },

    /// Delete the host cache
    ClearCache,

    /// Print the effective configuration and cache state
    ShowConfig,

    /// Open a session to the selected hosts
    Connect {
        /// Select hosts whose name or IP matches (repeatable; default: all)
        #[arg(short, long = "select", value_name = "REGEX")]
        select: Vec<String>,

        /// One window per host instead of split panes
        #[arg(long)]
        windows: bool,

        /// Synchronize input across all panes
        #[arg(long)]
        broadcast: bool,

        /// Ignore the host cache and fetch from providers
        #[arg(long)]
        refresh: bool,

        /// Build the session but do not attach to it
        #[arg(long)]
        no_attach: bool,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())
        .await
        .context("Failed to load configuration")?;
    sshplex::init_logging(&config.logging).context("Failed to initialize logging")?;
    let cache = HostCache::from_config(&config.cache);

    match cli.command {
        Commands::ListProviders => {
            let providers = commands::list_providers(&config);
            if cli.json {
                return print_json(&providers);
            }
            for p in providers {
                let filtered = if p.filtered { " [filtered]" } else { "" };
                println!("{:<20} {:<8} {}{}", p.name, p.kind, p.source, filtered);
            }
        }
        Commands::Debug { sequential } => {
            let mut options = FetchOptions::from_config(&config.sot);
            if sequential {
                options = options.sequential();
            }
            let report = commands::debug_fetch_with(&config, &options).await;
            if cli.json {
                return print_json(&report);
            }
            for p in &report.providers {
                match &p.error {
                    Some(e) => println!("{:<20} FAILED  {:>6}ms  {}", p.name, p.elapsed_ms, e),
                    None => println!(
                        "{:<20} ok      {:>6}ms  {} hosts",
                        p.name, p.elapsed_ms, p.host_count
                    ),
                }
            }
            println!(
                "{} hosts after merge, {} of {} providers failed, {}ms total",
                report.merged_hosts,
                report.failed(),
                report.providers.len(),
                report.elapsed_ms
            );
        }
        Commands::ClearCache => {
            if commands::clear_cache(&cache)? {
                println!("Cache cleared: {}", cache.path().display());
            } else {
                println!("No cache at {}", cache.path().display());
            }
        }
        Commands::ShowConfig => {
            let overview = commands::show_config(&config, &cache);
            if cli.json {
                return print_json(&overview);
            }
            print!("{}", serde_yaml::to_string(&overview.config)?);
            match &overview.cache {
                Some(info) => println!(
                    "# cache: {} hosts, {}s old, {}",
                    info.host_count,
                    info.age_secs,
                    if info.valid { "valid" } else { "expired" }
                ),
                None => println!("# cache: empty"),
            }
        }
        Commands::Connect {
            select,
            windows,
            broadcast,
            refresh,
            no_attach,
        } => {
            let request = SessionRequest {
                hosts: Vec::new(),
                mode: if windows {
                    SessionMode::Windows
                } else {
                    SessionMode::Panes
                },
                broadcast: broadcast || config.tmux.broadcast,
                attach: !no_attach,
            };
            return connect(&config, &cache, &select, refresh, request, cli.json).await;
        }
    }

    Ok(())
}

async fn connect(
    config: &Config,
    cache: &HostCache,
    patterns: &[String],
    refresh: bool,
    mut request: SessionRequest,
    json: bool,
) -> Result<()> {
    let response = commands::fetch_hosts(config, cache, !refresh).await;
    if let Some(summary) = response.inventory.failure_summary() {
        eprintln!("Warning: {}", summary);
    }

    request.hosts = commands::select_hosts(&response.inventory.hosts, patterns)
        .context("Invalid --select pattern")?;
    if request.hosts.is_empty() {
        bail!(
            "No hosts selected ({} in inventory{})",
            response.inventory.hosts.len(),
            if response.from_cache { ", from cache" } else { "" }
        );
    }

    let report = match commands::build_session(config, &request).await {
        Ok(report) => report,
        Err(SessionError::EmptySelection { invalid }) => {
            for pane in &invalid {
                if let PaneStatus::InvalidTarget { reason } = &pane.status {
                    eprintln!("  SKIPPED  {}: {}", pane.host, reason);
                }
            }
            bail!("No connectable hosts among the {} selected", invalid.len());
        }
        Err(e) => return Err(e.into()),
    };
    if json {
        return print_json(&report);
    }
    print_report(&report);
    Ok(())
}

fn print_report(report: &SessionReport) {
    println!(
        "Session {}: {} connected, {} failed, {} invalid",
        report.session_name,
        report.connected(),
        report.failed(),
        report.invalid()
    );
    for pane in &report.panes {
        match &pane.status {
            PaneStatus::Connected => {}
            PaneStatus::Failed { reason, .. } => println!("  FAILED   {}: {}", pane.host, reason),
            PaneStatus::InvalidTarget { reason } => println!("  SKIPPED  {}: {}", pane.host, reason),
        }
    }
    for warning in &report.warnings {
        println!("  warning: {}", warning);
    }
    match &report.attach {
        Some(AttachOutcome::Manual { instruction }) => println!("Attach with: {}", instruction),
        Some(AttachOutcome::Launched) => println!("Opened in iTerm2"),
        Some(AttachOutcome::Attached { exit_code }) => {
            tracing::debug!("Attach exited with {:?}", exit_code)
        }
        None => println!(
            "Attach with: {}",
            sshplex::session::manual_attach_instruction(&report.session_name)
        ),
    }
}
