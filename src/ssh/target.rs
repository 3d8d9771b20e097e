//! Resolved SSH connection targets

use serde::Serialize;

/// Host key verification mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostKeyPolicy {
    /// Refuse unknown and changed keys
    Strict,
    /// Record unknown keys, refuse changed ones
    AcceptNew,
}

impl HostKeyPolicy {
    pub fn from_strict(strict: bool) -> Self {
        if strict {
            HostKeyPolicy::Strict
        } else {
            HostKeyPolicy::AcceptNew
        }
    }

    /// Value for `-o StrictHostKeyChecking=`
    pub fn as_ssh_option(&self) -> &'static str {
        match self {
            HostKeyPolicy::Strict => "yes",
            HostKeyPolicy::AcceptNew => "accept-new",
        }
    }
}

/// Jump host a target is relayed through
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyJump {
    /// Route name, for logs and errors
    pub name: String,
    pub host: String,
    pub username: String,
    /// Empty means the ssh client's default identities
    pub key_path: String,
    pub port: u16,
}

/// Fully specified connection to one host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SshTarget {
    /// IP when known, otherwise the host name
    pub address: String,
    pub username: String,
    pub key_path: String,
    pub port: u16,
    pub host_key_policy: HostKeyPolicy,
    /// Empty means the ssh client default
    pub known_hosts_file: String,
    /// ConnectTimeout in seconds
    pub connect_timeout: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxyJump>,
}

impl SshTarget {
    /// `user@address`
    pub fn destination(&self) -> String {
        format!("{}@{}", self.username, self.address)
    }
}
