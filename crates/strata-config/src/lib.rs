//! Layered configuration engine
//!
//! This crate resolves runtime settings from several competing sources into a
//! single, versioned view:
//! - Ingests command line, environment, file and database sources into raw bags
//! - Reconciles the bags by fixed source priority
//! - Keeps a bounded per-key version history with forward-only rollback
//! - Polls watched files and re-applies them on change (hot reload)
//! - Fans out add/update/remove events to registered listeners
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         ConfigManager                            │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐           │
//! │  │ SourceLoader │  │ SourceLoader │  │ SourceLoader │  (ingest) │
//! │  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘           │
//! │         └─────────────────┴─────────────────┘                    │
//! │                           │                                      │
//! │                  ┌────────▼────────┐      ┌──────────────────┐   │
//! │                  │  SourceRegistry │◄─────│ HotReloadWatcher │   │
//! │                  └────────┬────────┘      └──────────────────┘   │
//! │                     (reconcile)                                  │
//! │                  ┌────────▼────────┐                             │
//! │                  │   ConfigStore   │──► VersionHistory           │
//! │                  └────────┬────────┘                             │
//! │                      ListenerBus                                 │
//! └───────────────────────────┬─────────────────────────────────────┘
//!                             │
//!          ┌──────────────────┼──────────────────┐
//!          ▼                  ▼                  ▼
//!      Listeners          Listeners          Listeners
//! ```

pub mod events;
pub mod history;
pub mod item;
pub mod listeners;
pub mod manager;
pub mod merger;
pub mod options;
pub mod sources;
pub mod store;
pub mod views;
pub mod watcher;

// Re-export main types
pub use events::{ConfigEvent, ConfigSource};
pub use history::VersionHistory;
pub use item::{ConfigItem, ItemAttributes};
pub use listeners::{ConfigListener, ListenerBus, ListenerId};
pub use manager::{ConfigManager, ConfigManagerBuilder, ConfigSummary, ImportReport};
pub use merger::{RawBag, SourceRegistry};
pub use options::ManagerOptions;
pub use sources::SourceLoader;
pub use store::ConfigStore;
pub use views::{AppSettings, WebSettings};

/// Error types for configuration operations
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration key '{key}' is read-only")]
    ReadOnly { key: String },

    #[error("version {version} of '{key}' not found in history")]
    VersionNotFound { key: String, version: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Watcher error: {0}")]
    Watcher(String),

    #[error("nested mutation of '{key}' rejected at listener depth {depth}")]
    Reentrant { key: String, depth: usize },

    #[error("configuration manager has been shut down")]
    ShutDown,

    #[error("Source error: {source_name}: {source}")]
    Source {
        source_name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ConfigError {
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn watcher(msg: impl Into<String>) -> Self {
        Self::Watcher(msg.into())
    }

    pub fn source(
        source_name: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Source {
            source_name: source_name.into(),
            source: Box::new(source),
        }
    }
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;
