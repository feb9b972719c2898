//! Configuration items

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::events::ConfigSource;

/// Placeholder shown instead of sensitive values
pub const MASK: &str = "***";

/// One recorded value of a configuration key
///
/// Items are shared as `Arc<ConfigItem>` between the store and the version
/// history and are never mutated once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigItem {
    pub key: String,
    pub value: String,
    pub source: ConfigSource,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Per-key version, starts at 1 and only grows
    pub version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Masked in listings, exports and logs
    pub sensitive: bool,
    /// Rejects every further write
    pub read_only: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl ConfigItem {
    /// Create an item stamped with the current time and default attributes
    pub fn new(
        key: impl Into<String>,
        value: impl Into<String>,
        source: ConfigSource,
        version: u64,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            source,
            timestamp: OffsetDateTime::now_utc(),
            version,
            description: None,
            sensitive: false,
            read_only: false,
            metadata: BTreeMap::new(),
        }
    }

    /// Replace the descriptive attributes, keeping value, source, version and timestamp
    pub fn with_attributes(mut self, attributes: ItemAttributes) -> Self {
        self.description = attributes.description;
        self.sensitive = attributes.sensitive;
        self.read_only = attributes.read_only;
        self.metadata = attributes.metadata;
        self
    }

    /// Current descriptive attributes
    pub fn attributes(&self) -> ItemAttributes {
        ItemAttributes {
            description: self.description.clone(),
            sensitive: self.sensitive,
            read_only: self.read_only,
            metadata: self.metadata.clone(),
        }
    }

    /// Value suitable for display, masked when sensitive
    pub fn display_value(&self) -> &str {
        if self.sensitive { MASK } else { &self.value }
    }
}

impl std::fmt::Display for ConfigItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}={} (source={}, version={})",
            self.key,
            self.display_value(),
            self.source,
            self.version
        )
    }
}

/// Descriptive attributes of a key, separate from its value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemAttributes {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub sensitive: bool,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl ItemAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn sensitive(mut self, sensitive: bool) -> Self {
        self.sensitive = sensitive;
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}
