//! Host Cache
//!
//! Persists the merged inventory as `hosts.yaml` inside the cache directory.
//!
//! Validity is checked in two stages: the file's modification time against
//! the TTL (no parsing), then the embedded `fetched_at` and provider
//! fingerprint. Writes go to a uniquely named temp file that is renamed over
//! the cache, so readers never see a partial file.

use chrono::{DateTime, Utc};
use parking_lot::ReentrantMutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::config::CacheConfig;
use crate::sot::Host;

pub const CACHE_FILE: &str = "hosts.yaml";

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Cache file is corrupt: {0}")]
    Corrupt(String),
}

/// Persisted cache payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Provider fingerprint the hosts were fetched with
    pub fingerprint: String,
    pub fetched_at: DateTime<Utc>,
    pub ttl_secs: u64,
    #[serde(default)]
    pub provider_names: Vec<String>,
    #[serde(default)]
    pub hosts: Vec<Host>,
}

/// Why a lookup did not produce hosts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissReason {
    Empty,
    Expired,
    FingerprintMismatch,
    Corrupt,
}

#[derive(Debug)]
pub enum CacheLookup {
    Hit(CacheEntry),
    Miss(MissReason),
}

impl CacheLookup {
    pub fn into_hit(self) -> Option<CacheEntry> {
        match self {
            CacheLookup::Hit(entry) => Some(entry),
            CacheLookup::Miss(_) => None,
        }
    }
}

/// Summary shown by `sshplex show-config` and the debug command
#[derive(Debug, Clone, Serialize)]
pub struct CacheInfo {
    pub path: PathBuf,
    pub host_count: usize,
    pub provider_names: Vec<String>,
    pub fetched_at: DateTime<Utc>,
    pub age_secs: i64,
    pub ttl_secs: u64,
    pub valid: bool,
}

pub struct HostCache {
    dir: PathBuf,
    ttl: Duration,
    lock: ReentrantMutex<()>,
}

impl HostCache {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl,
            lock: ReentrantMutex::new(()),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(
            PathBuf::from(&config.cache_dir),
            Duration::from_secs(config.ttl_hours * 3600),
        )
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(CACHE_FILE)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn load(&self, fingerprint: &str) -> Result<CacheLookup, CacheError> {
        self.load_at(fingerprint, Utc::now())
    }

    /// Look up the cache as of `now`
    pub fn load_at(&self, fingerprint: &str, now: DateTime<Utc>) -> Result<CacheLookup, CacheError> {
        let _guard = self.lock.lock();
        let path = self.path();

        // Stage 1: file age only
        let seen = match fs::metadata(&path) {
            Ok(meta) => meta.modified()?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(CacheLookup::Miss(MissReason::Empty));
            }
            Err(e) => return Err(e.into()),
        };
        if self.expired(DateTime::<Utc>::from(seen), now) {
            tracing::debug!("Cache file {:?} older than TTL", path);
            return Ok(CacheLookup::Miss(MissReason::Expired));
        }

        // Stage 2: full parse
        let contents = fs::read_to_string(&path)?;
        let entry: CacheEntry = match serde_yaml::from_str(&contents) {
            Ok(entry) => entry,
            Err(e) => {
                let err = CacheError::Corrupt(e.to_string());
                tracing::warn!("{}, discarding {:?}", err, path);
                self.discard_if_unchanged(seen)?;
                return Ok(CacheLookup::Miss(MissReason::Corrupt));
            }
        };

        if self.expired(entry.fetched_at, now) {
            tracing::debug!("Cached inventory fetched at {} is stale", entry.fetched_at);
            return Ok(CacheLookup::Miss(MissReason::Expired));
        }
        if entry.fingerprint != fingerprint {
            tracing::info!("Provider configuration changed since the cache was written");
            return Ok(CacheLookup::Miss(MissReason::FingerprintMismatch));
        }

        tracing::info!(
            "Loaded {} hosts from cache (fetched {})",
            entry.hosts.len(),
            entry.fetched_at
        );
        Ok(CacheLookup::Hit(entry))
    }

    fn expired(&self, written: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match (now - written).to_std() {
            Ok(age) => age > self.ttl,
            // Written "in the future" (clock skew): treat as fresh
            Err(_) => false,
        }
    }

    /// Atomically replace the cache
    pub fn save(
        &self,
        fingerprint: &str,
        provider_names: Vec<String>,
        hosts: &[Host],
    ) -> Result<CacheEntry, CacheError> {
        let entry = CacheEntry {
            fingerprint: fingerprint.to_string(),
            fetched_at: Utc::now(),
            ttl_secs: self.ttl.as_secs(),
            provider_names,
            hosts: hosts.to_vec(),
        };
        self.write_entry(&entry)?;
        tracing::info!("Cached {} hosts to {:?}", entry.hosts.len(), self.path());
        Ok(entry)
    }

    fn write_entry(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        let _guard = self.lock.lock();
        fs::create_dir_all(&self.dir)?;

        let yaml = serde_yaml::to_string(entry)?;
        let path = self.path();
        // Unique per writer, so two processes never share a temp file
        let temp_path = self
            .dir
            .join(format!(".{}.{}.tmp", CACHE_FILE, uuid::Uuid::new_v4().simple()));

        let write = |temp: &Path| -> std::io::Result<()> {
            let mut file = fs::File::create(temp)?;
            file.write_all(yaml.as_bytes())?;
            file.sync_all()?;
            fs::rename(temp, &path)
        };
        if let Err(e) = write(&temp_path) {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }
        Ok(())
    }

    /// Delete the cache file. Returns whether one existed.
    pub fn invalidate(&self) -> Result<bool, CacheError> {
        let _guard = self.lock.lock();
        match fs::remove_file(self.path()) {
            Ok(()) => {
                tracing::info!("Cache cleared: {:?}", self.path());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove the cache file only if its mtime is still `seen`. Another
    /// writer may have replaced the file since it was read.
    fn discard_if_unchanged(&self, seen: SystemTime) -> Result<bool, CacheError> {
        let _guard = self.lock.lock();
        let path = self.path();
        let current = match fs::metadata(&path) {
            Ok(meta) => meta.modified()?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        if current != seen {
            tracing::debug!("Cache file {:?} was rewritten, keeping it", path);
            return Ok(false);
        }
        self.invalidate()
    }

    /// Describe the current cache file, if any
    pub fn info(&self) -> Result<Option<CacheInfo>, CacheError> {
        let _guard = self.lock.lock();
        let path = self.path();
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let entry: CacheEntry =
            serde_yaml::from_str(&contents).map_err(|e| CacheError::Corrupt(e.to_string()))?;

        let now = Utc::now();
        Ok(Some(CacheInfo {
            path,
            host_count: entry.hosts.len(),
            age_secs: (now - entry.fetched_at).num_seconds(),
            valid: !self.expired(entry.fetched_at, now),
            provider_names: entry.provider_names,
            fetched_at: entry.fetched_at,
            ttl_secs: self.ttl.as_secs(),
        }))
    }
}
