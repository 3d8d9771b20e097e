//! Connection Target Resolver
//!
//! Maps a selected host to an [`SshTarget`] using the SSH defaults, the host's
//! own overrides and the proxy routes. All validation happens here, before
//! any connection attempt.

use super::error::ResolveError;
use super::target::{HostKeyPolicy, ProxyJump, SshTarget};
use crate::config::{expand_tilde, ProxyRoute, SshSettings};
use crate::sot::Host;

fn check_port(port: u32) -> Result<u16, ResolveError> {
    match u16::try_from(port) {
        Ok(p) if p != 0 => Ok(p),
        _ => Err(ResolveError::PortOutOfRange(port)),
    }
}

/// First route claiming the host's provider wins
pub fn find_route<'a>(host: &Host, routes: &'a [ProxyRoute]) -> Option<&'a ProxyRoute> {
    routes
        .iter()
        .find(|route| route.imports.iter().any(|i| *i == host.provider_name))
}

fn proxy_jump(route: &ProxyRoute) -> Result<ProxyJump, ResolveError> {
    let invalid = |reason: &str| ResolveError::InvalidProxy {
        route: route.name.clone(),
        reason: reason.to_string(),
    };

    if route.host.trim().is_empty() {
        return Err(invalid("missing host"));
    }
    if route.username.trim().is_empty() {
        return Err(invalid("missing username"));
    }
    let port = check_port(route.port).map_err(|e| invalid(&e.to_string()))?;

    Ok(ProxyJump {
        name: route.name.clone(),
        host: route.host.trim().to_string(),
        username: route.username.trim().to_string(),
        key_path: expand_tilde(&route.key_path),
        port,
    })
}

/// Resolve one host. A malformed proxy route fails this host only.
pub fn resolve(
    host: &Host,
    ssh: &SshSettings,
    routes: &[ProxyRoute],
) -> Result<SshTarget, ResolveError> {
    if !host.is_valid() {
        return Err(ResolveError::MissingAddress);
    }

    let username = host
        .ssh_user
        .as_deref()
        .filter(|u| !u.trim().is_empty())
        .unwrap_or(ssh.username.as_str())
        .trim();
    if username.is_empty() {
        return Err(ResolveError::EmptyUsername);
    }

    let port = check_port(host.ssh_port.unwrap_or(ssh.port))?;

    let proxy = match find_route(host, routes) {
        Some(route) => {
            let jump = proxy_jump(route)?;
            tracing::debug!(
                "Host '{}' routed through proxy '{}'",
                host.display_name(),
                jump.name
            );
            Some(jump)
        }
        None => None,
    };

    Ok(SshTarget {
        address: host.address().to_string(),
        username: username.to_string(),
        key_path: expand_tilde(&ssh.key_path),
        port,
        host_key_policy: HostKeyPolicy::from_strict(ssh.strict_host_key_checking),
        known_hosts_file: expand_tilde(&ssh.user_known_hosts_file),
        connect_timeout: ssh.timeout,
        proxy,
    })
}
