//! Options controlling the configuration engine itself

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::history::DEFAULT_HISTORY_CAPACITY;
use crate::item::ItemAttributes;
use crate::{ConfigError, Result};

/// Default hot reload polling interval
pub const DEFAULT_HOT_RELOAD_INTERVAL_MS: u64 = 5000;

/// Default environment variable prefix
pub const DEFAULT_ENV_PREFIX: &str = "APP_";

/// Engine options, usually read from a small TOML file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerOptions {
    /// Versions kept per key
    pub history_capacity: usize,
    /// Prefix selecting environment variables, e.g. `APP_`
    pub env_prefix: String,
    /// Start the poller as soon as the manager is built
    pub hot_reload_enabled: bool,
    pub hot_reload_interval_ms: u64,
    /// Layer filesystem notifications under the poller
    pub native_events: bool,
    /// Files ingested as the File source, in order
    pub files: Vec<PathBuf>,
    /// Files registered for hot reload at startup
    pub watch: Vec<PathBuf>,
    /// Keys created read-only
    pub read_only_keys: Vec<String>,
    /// Keys created sensitive
    pub sensitive_keys: Vec<String>,
    /// Database source contents
    pub database: BTreeMap<String, String>,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
            hot_reload_enabled: false,
            hot_reload_interval_ms: DEFAULT_HOT_RELOAD_INTERVAL_MS,
            native_events: false,
            files: default_files(),
            watch: Vec::new(),
            read_only_keys: Vec::new(),
            sensitive_keys: Vec::new(),
            database: default_database(),
        }
    }
}

fn default_files() -> Vec<PathBuf> {
    [
        "application.properties",
        "config.properties",
        "database.properties",
        "security.properties",
    ]
    .into_iter()
    .map(PathBuf::from)
    .collect()
}

fn default_database() -> BTreeMap<String, String> {
    [
        ("db.connection.pool.size", "10"),
        ("db.connection.timeout", "30"),
        ("db.query.timeout", "60"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

impl ManagerOptions {
    /// Parse from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let options: Self = toml::from_str(toml_str)
            .map_err(|e| ConfigError::parse(format!("TOML parse error: {e}")))?;
        options.validate()?;
        Ok(options)
    }

    /// Read and parse an options file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.history_capacity == 0 {
            return Err(ConfigError::validation("history_capacity must be > 0"));
        }
        if self.hot_reload_interval_ms == 0 {
            return Err(ConfigError::validation("hot_reload_interval_ms must be > 0"));
        }
        Ok(())
    }

    pub fn hot_reload_interval(&self) -> Duration {
        Duration::from_millis(self.hot_reload_interval_ms)
    }

    pub fn key_policy(&self) -> KeyPolicy {
        KeyPolicy {
            read_only: self.read_only_keys.iter().cloned().collect(),
            sensitive: self.sensitive_keys.iter().cloned().collect(),
        }
    }
}

/// Attributes given to keys the first time they receive a value
#[derive(Debug, Clone, Default)]
pub struct KeyPolicy {
    read_only: HashSet<String>,
    sensitive: HashSet<String>,
}

impl KeyPolicy {
    pub fn attributes_for(&self, key: &str) -> ItemAttributes {
        ItemAttributes::new()
            .read_only(self.read_only.contains(key))
            .sensitive(self.sensitive.contains(key))
    }
}
