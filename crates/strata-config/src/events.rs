//! Configuration sources and change events

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::item::ConfigItem;

/// Origin of a configuration value
///
/// Every source has a fixed priority rank; a smaller rank wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    /// Arguments passed on the command line
    CommandLine,
    /// Process environment variables
    Environment,
    /// Runtime overrides set through the API
    Memory,
    /// Property or TOML files
    File,
    /// Values supplied by the database collaborator
    Database,
}

impl ConfigSource {
    /// Returns all sources in ascending rank order (highest precedence first)
    pub fn by_priority() -> &'static [ConfigSource] {
        &[
            Self::CommandLine,
            Self::Environment,
            Self::Memory,
            Self::File,
            Self::Database,
        ]
    }

    /// Priority rank, smaller means higher precedence
    pub fn rank(self) -> u8 {
        match self {
            Self::CommandLine => 1,
            Self::Environment => 2,
            Self::Memory => 3,
            Self::File => 4,
            Self::Database => 5,
        }
    }

    /// True when `self` strictly outranks `other`
    pub fn outranks(self, other: ConfigSource) -> bool {
        self.rank() < other.rank()
    }

    pub(crate) fn index(self) -> usize {
        usize::from(self.rank() - 1)
    }

    /// Parse source from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "command_line" | "commandline" | "cli" => Some(Self::CommandLine),
            "environment" | "env" => Some(Self::Environment),
            "memory" => Some(Self::Memory),
            "file" => Some(Self::File),
            "database" | "db" => Some(Self::Database),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CommandLine => write!(f, "command_line"),
            Self::Environment => write!(f, "environment"),
            Self::Memory => write!(f, "memory"),
            Self::File => write!(f, "file"),
            Self::Database => write!(f, "database"),
        }
    }
}

/// Event delivered to listeners after a mutation has committed
#[derive(Debug, Clone)]
pub enum ConfigEvent {
    /// A key without a current value received one
    Added { key: String, item: Arc<ConfigItem> },
    /// The current value of a key was replaced
    Updated {
        key: String,
        old: Arc<ConfigItem>,
        new: Arc<ConfigItem>,
    },
    /// A key was removed from the store
    Removed { key: String, item: Arc<ConfigItem> },
}

impl ConfigEvent {
    /// Build the event for replacing `old` (if any) with `new`
    pub(crate) fn for_write(old: Option<Arc<ConfigItem>>, new: Arc<ConfigItem>) -> Self {
        let key = new.key.clone();
        match old {
            Some(old) => Self::Updated { key, old, new },
            None => Self::Added { key, item: new },
        }
    }

    /// Key this event refers to
    pub fn key(&self) -> &str {
        match self {
            Self::Added { key, .. } | Self::Updated { key, .. } | Self::Removed { key, .. } => key,
        }
    }

    /// Short name of the event kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Added { .. } => "added",
            Self::Updated { .. } => "updated",
            Self::Removed { .. } => "removed",
        }
    }

    /// The item that is current after the event, if any
    pub fn current(&self) -> Option<&Arc<ConfigItem>> {
        match self {
            Self::Added { item, .. } => Some(item),
            Self::Updated { new, .. } => Some(new),
            Self::Removed { .. } => None,
        }
    }
}
