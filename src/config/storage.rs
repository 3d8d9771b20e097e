//! Configuration Storage
//!
//! Locates and reads `sshplex.yaml`.
//! Config location: ~/.config/sshplex/sshplex.yaml on every platform.

use std::path::{Path, PathBuf};
use tokio::fs;

use super::types::{Config, ProviderSource};

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to determine home directory")]
    NoConfigDir,

    #[error("Config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Expand a leading `~` to the user's home directory
pub fn expand_tilde(path: &str) -> String {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped).to_string_lossy().into_owned();
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home.to_string_lossy().into_owned();
        }
    }
    path.to_string()
}

/// Get the SSHplex configuration directory (~/.config/sshplex)
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|home| home.join(".config").join("sshplex"))
        .ok_or(ConfigError::NoConfigDir)
}

/// Get the log directory for storing application logs
pub fn log_dir() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("logs"))
}

/// Get the default config file path
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("sshplex.yaml"))
}

/// Load, normalize and validate a configuration file.
///
/// `None` reads the default location.
pub async fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => default_config_path()?,
    };

    let contents = match fs::read_to_string(&path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::NotFound(path));
        }
        Err(e) => return Err(ConfigError::Io(e)),
    };

    let config = parse_config(&contents)?;
    tracing::debug!(
        "Loaded config from {:?} ({} provider imports)",
        path,
        config.sot.imports.len()
    );
    Ok(config)
}

/// Parse YAML text into a validated [`Config`] with `~` expanded
pub fn parse_config(contents: &str) -> Result<Config, ConfigError> {
    let mut config: Config = serde_yaml::from_str(contents)?;

    let problems = config.validate();
    if !problems.is_empty() {
        return Err(ConfigError::Invalid(problems));
    }

    expand_paths(&mut config);
    Ok(config)
}

// Fingerprint is computed on the expanded form, so `~` and $HOME spellings agree
fn expand_paths(config: &mut Config) {
    config.ssh.key_path = expand_tilde(&config.ssh.key_path);
    config.ssh.user_known_hosts_file = expand_tilde(&config.ssh.user_known_hosts_file);
    config.cache.cache_dir = expand_tilde(&config.cache.cache_dir);
    config.logging.file = expand_tilde(&config.logging.file);

    for route in &mut config.ssh.proxy {
        route.key_path = expand_tilde(&route.key_path);
    }

    for import in &mut config.sot.imports {
        if let ProviderSource::Ansible { inventory_paths } = &mut import.source {
            for path in inventory_paths.iter_mut() {
                *path = expand_tilde(path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_expand_tilde() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(
            expand_tilde("~/.ssh/id_rsa"),
            home.join(".ssh/id_rsa").to_string_lossy()
        );
        assert_eq!(expand_tilde("~"), home.to_string_lossy());
        assert_eq!(expand_tilde("/etc/hosts"), "/etc/hosts");
        assert_eq!(expand_tilde("relative/~/path"), "relative/~/path");
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sshplex.yaml");

        let err = load_config(Some(&path)).await.unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(p) if p == path));
    }

    #[tokio::test]
    async fn test_load_expands_paths() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sshplex.yaml");
        std::fs::write(
            &path,
            "sot:\n  import:\n    - name: lab\n      type: ansible\n      inventory_paths: [\"~/inv.yml\"]\n",
        )
        .unwrap();

        let config = load_config(Some(&path)).await.unwrap();
        let home = dirs::home_dir().unwrap();
        assert_eq!(config.ssh.key_path, home.join(".ssh/id_rsa").to_string_lossy());
        assert_eq!(config.cache.cache_dir, home.join(".cache/sshplex").to_string_lossy());
        match &config.sot.imports[0].source {
            ProviderSource::Ansible { inventory_paths } => {
                assert_eq!(inventory_paths[0], home.join("inv.yml").to_string_lossy());
            }
            other => panic!("Expected ansible source, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_bad_yaml() {
        let err = parse_config("sot: [unclosed").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }

    #[test]
    fn test_parse_invalid_lists_problems() {
        let yaml = r#"
sot:
  import:
    - name: lab
      type: ansible
ssh:
  retry:
    max_attempts: 11
"#;
        match parse_config(yaml).unwrap_err() {
            ConfigError::Invalid(problems) => {
                assert_eq!(problems.len(), 2);
                assert!(problems[0].contains("inventory path"));
                assert!(problems[1].contains("max_attempts"));
            }
            other => panic!("Expected Invalid, got {:?}", other),
        }
    }
}
