//! Environment configuration
//!
//! Every setting comes from an environment variable, optionally loaded from a
//! `.env` file in the working directory.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::cache::memory::DEFAULT_CAPACITY;
use crate::cache::DiskStore;
use crate::keys::{DEFAULT_DURABLE_PREFIX, DEFAULT_VOLATILE_PREFIX};
use crate::orchestrator::DEFAULT_ORIGIN_TIMEOUT;
use crate::origin::wikipedia::DEFAULT_API_URL;

/// Default IPC socket path
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/wikistash.sock";

/// Default B2 bucket name
pub const DEFAULT_BUCKET: &str = "wikistash-store";

/// Where durable objects live
#[derive(Debug, Clone, PartialEq)]
pub enum DurableBackend {
    Disk { dir: PathBuf },
    B2 {
        key_id: String,
        key: String,
        bucket: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub volatile_ttl: Duration,
    pub volatile_capacity: u64,
    pub volatile_timeout: Duration,
    pub durable_timeout: Duration,
    pub origin_timeout: Duration,
    pub volatile_prefix: String,
    pub durable_prefix: String,
    pub durable: DurableBackend,
    pub origin_url: String,
    pub socket_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            volatile_ttl: Duration::from_secs(3600),
            volatile_capacity: DEFAULT_CAPACITY,
            volatile_timeout: Duration::from_millis(50),
            durable_timeout: Duration::from_secs(2),
            origin_timeout: DEFAULT_ORIGIN_TIMEOUT,
            volatile_prefix: DEFAULT_VOLATILE_PREFIX.to_string(),
            durable_prefix: DEFAULT_DURABLE_PREFIX.to_string(),
            durable: DurableBackend::Disk {
                dir: DiskStore::default_dir(),
            },
            origin_url: DEFAULT_API_URL.to_string(),
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
        }
    }
}

impl Config {
    /// Durable backend description safe for logs (no credentials)
    pub fn durable_label(&self) -> String {
        match &self.durable {
            DurableBackend::Disk { dir } => format!("disk:{}", dir.display()),
            DurableBackend::B2 { bucket, .. } => format!("b2:{}", bucket),
        }
    }

    /// Load `.env` (if present) and read the process environment
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a config from an arbitrary variable source
    pub fn from_lookup<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let durable = match var("WIKISTASH_DURABLE").as_deref().unwrap_or("disk") {
            "disk" => DurableBackend::Disk {
                dir: var("WIKISTASH_CACHE_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(DiskStore::default_dir),
            },
            "b2" => DurableBackend::B2 {
                key_id: var("B2_KEY_ID")
                    .ok_or_else(|| anyhow!("B2_KEY_ID is required when WIKISTASH_DURABLE=b2"))?,
                key: var("B2_KEY")
                    .ok_or_else(|| anyhow!("B2_KEY is required when WIKISTASH_DURABLE=b2"))?,
                bucket: var("B2_BUCKET").unwrap_or_else(|| DEFAULT_BUCKET.to_string()),
            },
            other => {
                return Err(anyhow!(
                    "WIKISTASH_DURABLE must be 'disk' or 'b2', got '{}'",
                    other
                ))
            }
        };

        Ok(Self {
            volatile_ttl: parsed(&var, "WIKISTASH_VOLATILE_TTL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.volatile_ttl),
            volatile_capacity: parsed(&var, "WIKISTASH_VOLATILE_CAPACITY")?
                .unwrap_or(defaults.volatile_capacity),
            volatile_timeout: parsed(&var, "WIKISTASH_VOLATILE_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.volatile_timeout),
            durable_timeout: parsed(&var, "WIKISTASH_DURABLE_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.durable_timeout),
            origin_timeout: parsed(&var, "WIKISTASH_ORIGIN_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.origin_timeout),
            volatile_prefix: var("WIKISTASH_VOLATILE_PREFIX").unwrap_or(defaults.volatile_prefix),
            durable_prefix: var("WIKISTASH_DURABLE_PREFIX").unwrap_or(defaults.durable_prefix),
            durable,
            origin_url: var("WIKISTASH_ORIGIN_URL").unwrap_or(defaults.origin_url),
            socket_path: var("WIKISTASH_SOCKET")
                .map(PathBuf::from)
                .unwrap_or(defaults.socket_path),
        })
    }
}

fn parsed<T, F>(var: &F, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow!("Invalid {}='{}': {}", name, raw, e)),
    }
}
