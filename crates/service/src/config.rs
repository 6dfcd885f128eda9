//! Process configuration.
//!
//! One JSON file, every field optional. The path comes from the
//! `DEPOT_CONFIG` environment variable, falling back to `depot.json` in the
//! working directory, falling back to built-in defaults when neither exists.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use depot_core::ItemTag;
use depot_status::ServiceTarget;
use depot_store::{RetryPolicy, StoreOptions};
use serde::Deserialize;

pub const CONFIG_ENV: &str = "DEPOT_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "depot.json";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DepotConfig {
    /// Global gate for zero-stock auto-removal.
    pub remove_on_zero: bool,
    /// UTC offset, in minutes, deciding which calendar day a ledger append
    /// lands on.
    pub ledger_utc_offset_minutes: i32,
    /// Items seeded at startup when absent. Never overwrites live stock.
    pub catalogue: Vec<CatalogueItem>,
    /// Device slot id to item name, for deriving movements from frames.
    pub device_slots: HashMap<String, String>,
    /// Services the status page watches.
    pub services: Vec<ServiceTarget>,
    /// Which `services` entry is answered from the device-online flag
    /// instead of a network probe.
    pub device_service_name: Option<String>,
    pub status_ttl_secs: u64,
    pub probe_timeout_secs: u64,
    pub backend: BackendConfig,
    pub apply_retry: RetryConfig,
}

impl Default for DepotConfig {
    fn default() -> Self {
        Self {
            remove_on_zero: true,
            ledger_utc_offset_minutes: 0,
            catalogue: Vec::new(),
            device_slots: HashMap::new(),
            services: Vec::new(),
            device_service_name: None,
            status_ttl_secs: 10,
            probe_timeout_secs: 3,
            backend: BackendConfig::default(),
            apply_retry: RetryConfig::default(),
        }
    }
}

/// One pre-seeded catalogue entry.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogueItem {
    pub name: String,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub tag: Option<ItemTag>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendConfig {
    #[default]
    Memory,
    Sqlite {
        path: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub attempts: u32,
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            attempts: policy.attempts,
            backoff_ms: policy.backoff.as_millis() as u64,
        }
    }
}

impl DepotConfig {
    /// Resolve the config path and load it.
    pub fn load() -> anyhow::Result<Self> {
        match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::from_file(Path::new(&path)),
            Err(_) => {
                let fallback = Path::new(DEFAULT_CONFIG_PATH);
                if fallback.exists() {
                    Self::from_file(fallback)
                } else {
                    tracing::info!("no config file found, using defaults");
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(raw)?)
    }

    pub fn status_ttl(&self) -> Duration {
        Duration::from_secs(self.status_ttl_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            remove_on_zero: self.remove_on_zero,
            utc_offset_minutes: self.ledger_utc_offset_minutes,
            retry: RetryPolicy {
                attempts: self.apply_retry.attempts,
                backoff: Duration::from_millis(self.apply_retry.backoff_ms),
            },
        }
    }
}
