// Tracing initialization with a log level that can be changed at runtime.
use std::sync::OnceLock;

use strata_config::{ConfigEvent, ConfigListener};
use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

/// Key whose value drives the log level while the process runs
pub const LOG_LEVEL_KEY: &str = "app.log.level";

static LOG_RELOAD_HANDLE: OnceLock<reload::Handle<EnvFilter, tracing_subscriber::Registry>> =
    OnceLock::new();

pub fn init_tracing_with_level(level: &str) {
    // Prefer RUST_LOG from env, otherwise use provided level string.
    let base_filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|_| EnvFilter::try_from_default_env().ok())
        .or_else(|| EnvFilter::try_new(level.to_ascii_lowercase()).ok())
        .unwrap_or_else(|| EnvFilter::new("warn"));

    let (reload_layer, handle) = reload::Layer::new(base_filter);
    let _ = LOG_RELOAD_HANDLE.set(handle);

    let _ = tracing_subscriber::registry()
        .with(reload_layer)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// Apply a new logging level at runtime if the reload handle is configured
pub fn apply_logging_level(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(level.to_ascii_lowercase())?;
    if let Some(handle) = LOG_RELOAD_HANDLE.get() {
        handle.modify(|f| *f = filter)?;
        tracing::info!(level, "log level changed");
    }
    Ok(())
}

/// Listener applying changes of [`LOG_LEVEL_KEY`]
pub struct LogLevelListener;

impl ConfigListener for LogLevelListener {
    fn on_event(&self, event: &ConfigEvent) -> anyhow::Result<()> {
        if event.key() != LOG_LEVEL_KEY {
            return Ok(());
        }
        match event.current() {
            Some(item) => apply_logging_level(&item.value),
            None => Ok(()),
        }
    }
}
