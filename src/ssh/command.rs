//! ssh command lines
//!
//! Renders an [`SshTarget`] into the argument vector for the system `ssh`
//! client, and into the shell line typed into a multiplexer pane.

use super::target::{ProxyJump, SshTarget};

const DEFAULT_PORT: u16 = 22;

/// Connect timeout used by the non-interactive probe
pub const PROBE_CONNECT_TIMEOUT: u64 = 5;

fn proxy_command(proxy: &ProxyJump) -> String {
    let mut command = String::from("ssh");
    if !proxy.key_path.is_empty() {
        command.push_str(&format!(" -i {}", shell_words::quote(&proxy.key_path)));
    }
    if proxy.port != DEFAULT_PORT {
        command.push_str(&format!(" -p {}", proxy.port));
    }
    command.push_str(&format!(" -W %h:%p {}@{}", proxy.username, proxy.host));
    command
}

/// Options shared by the interactive command and the probe
fn common_options(target: &SshTarget, connect_timeout: u64) -> Vec<String> {
    let mut args = Vec::new();
    let mut option = |value: String| {
        args.push("-o".to_string());
        args.push(value);
    };

    if let Some(proxy) = &target.proxy {
        option(format!("ProxyCommand={}", proxy_command(proxy)));
    }
    option(format!(
        "StrictHostKeyChecking={}",
        target.host_key_policy.as_ssh_option()
    ));
    if !target.known_hosts_file.is_empty() {
        option(format!("UserKnownHostsFile={}", target.known_hosts_file));
    }
    option("LogLevel=ERROR".to_string());
    option(format!("ConnectTimeout={}", connect_timeout));

    if !target.key_path.is_empty() {
        args.push("-i".to_string());
        args.push(target.key_path.clone());
    }
    if target.port != DEFAULT_PORT {
        args.push("-p".to_string());
        args.push(target.port.to_string());
    }
    args
}

/// Arguments for an interactive session (program name excluded)
pub fn ssh_args(target: &SshTarget) -> Vec<String> {
    let mut args = common_options(target, target.connect_timeout);
    args.push(target.destination());
    args
}

/// Shell line for a pane: `TERM=xterm-256color ssh ...`, quoted
pub fn ssh_command_line(target: &SshTarget) -> String {
    let mut words = vec!["ssh".to_string()];
    words.extend(ssh_args(target));
    format!("TERM=xterm-256color {}", shell_words::join(words))
}

/// Arguments for a non-interactive reachability probe (program name excluded)
pub fn probe_args(target: &SshTarget) -> Vec<String> {
    let mut args = vec!["-o".to_string(), "BatchMode=yes".to_string()];
    args.extend(common_options(
        target,
        target.connect_timeout.min(PROBE_CONNECT_TIMEOUT),
    ));
    args.push(target.destination());
    args.push("exit".to_string());
    args
}
