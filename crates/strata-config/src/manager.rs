//! Configuration Manager
//!
//! Facade tying the store, the source bags, the listener bus and the hot reload
//! watcher together. One explicitly constructed instance is owned by the
//! application's composition root and cloned (cheaply) into whatever needs it.
//!
//! Loading never exposes half-merged state: [`ConfigManager::reload_all`]
//! ingests and reconciles into a fresh store off to the side, swaps it in as a
//! whole, and only then delivers the reconcile events.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufWriter, Write as _};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use arc_swap::ArcSwap;
use parking_lot::RwLock;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, info, warn};

use crate::events::{ConfigEvent, ConfigSource};
use crate::item::{ConfigItem, ItemAttributes};
use crate::listeners::{ConfigListener, ListenerBus, ListenerId, MAX_NOTIFY_DEPTH, notify_depth};
use crate::merger::{self, RawBag, SourceRegistry};
use crate::options::{KeyPolicy, ManagerOptions};
use crate::sources::{
    CommandLineSource, DatabaseSource, EnvironmentSource, FileSource, SourceLoader,
    escape_property, read_file,
};
use crate::store::ConfigStore;
use crate::watcher::{FileReloader, HotReloadWatcher};
use crate::{ConfigError, Result};

/// Configuration manager builder
pub struct ConfigManagerBuilder {
    options: ManagerOptions,
    files: Option<Vec<PathBuf>>,
    env_prefix: Option<String>,
    env_vars: Option<Vec<(String, String)>>,
    database: Option<RawBag>,
    args: Vec<String>,
    loaders: Vec<Box<dyn SourceLoader>>,
}

impl ConfigManagerBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            options: ManagerOptions::default(),
            files: None,
            env_prefix: None,
            env_vars: None,
            database: None,
            args: Vec::new(),
            loaders: Vec::new(),
        }
    }

    /// Use engine options, e.g. loaded from a TOML file
    pub fn with_options(mut self, options: ManagerOptions) -> Self {
        self.options = options;
        self
    }

    /// Add a file to the File source; replaces the default file list
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.files.get_or_insert_with(Vec::new).push(path.into());
        self
    }

    /// Replace the File source file list
    pub fn with_files<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.files = Some(paths.into_iter().map(Into::into).collect());
        self
    }

    /// Set the environment variable prefix
    pub fn with_environment(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Read environment variables from a fixed snapshot instead of the process
    pub fn with_env_vars<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env_vars = Some(
            vars.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// Set the content of the Database source
    pub fn with_database(mut self, entries: RawBag) -> Self {
        self.database = Some(entries);
        self
    }

    /// Set command line arguments (`--key=value`, `-Dkey=value`)
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Add a custom loader, ingested after the built-in ones
    pub fn with_loader(mut self, loader: Box<dyn SourceLoader>) -> Self {
        self.loaders.push(loader);
        self
    }

    /// Build the configuration manager
    ///
    /// Runs the initial ingest and reconcile, registers the configured watch
    /// paths and starts hot reload if enabled.
    pub fn build(self) -> Result<ConfigManager> {
        let Self {
            mut options,
            files,
            env_prefix,
            env_vars,
            database,
            args,
            loaders: extra,
        } = self;

        if let Some(files) = files {
            options.files = files;
        }
        if let Some(prefix) = env_prefix {
            options.env_prefix = prefix;
        }
        if let Some(database) = database {
            options.database = database;
        }
        options.validate()?;

        let environment = match env_vars {
            Some(vars) => EnvironmentSource::with_vars(options.env_prefix.clone(), vars),
            None => EnvironmentSource::new(options.env_prefix.clone()),
        };
        let mut loaders: Vec<Box<dyn SourceLoader>> = vec![
            Box::new(FileSource::new(options.files.clone())),
            Box::new(environment),
            Box::new(DatabaseSource::new(options.database.clone())),
        ];
        if !args.is_empty() {
            loaders.push(Box::new(CommandLineSource::new(args)));
        }
        loaders.extend(extra);

        ConfigManager::start(options, loaders)
    }
}

impl Default for ConfigManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts and state reported by [`ConfigManager::summary`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigSummary {
    /// Number of current items
    pub total: usize,
    /// Current items per winning source
    pub by_source: BTreeMap<ConfigSource, usize>,
    pub listeners: usize,
    pub hot_reload: bool,
    pub hot_reload_interval_ms: u64,
    pub watched_files: Vec<PathBuf>,
}

impl std::fmt::Display for ConfigSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Configuration summary")?;
        writeln!(f, "  total items: {}", self.total)?;
        for (source, count) in &self.by_source {
            writeln!(f, "  {source}: {count}")?;
        }
        writeln!(f, "  listeners: {}", self.listeners)?;
        if self.hot_reload {
            writeln!(f, "  hot reload: enabled ({} ms)", self.hot_reload_interval_ms)?;
        } else {
            writeln!(f, "  hot reload: disabled")?;
        }
        write!(f, "  watched files: {}", self.watched_files.len())?;
        for path in &self.watched_files {
            write!(f, "\n    {}", path.display())?;
        }
        Ok(())
    }
}

/// Outcome of [`ConfigManager::import_configs`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub imported: usize,
    /// Existing keys left alone because overwrite was off
    pub skipped: usize,
    /// Keys whose write was refused, e.g. read-only
    pub rejected: usize,
}

struct EngineState {
    store: ConfigStore,
    registry: SourceRegistry,
}

struct Inner {
    options: ManagerOptions,
    policy: Arc<KeyPolicy>,
    loaders: Vec<Box<dyn SourceLoader>>,
    state: ArcSwap<EngineState>,
    /// Held shared by mutations and exclusively by reload and shutdown;
    /// the flag records shutdown
    gate: RwLock<bool>,
    listeners: ListenerBus,
    watcher: HotReloadWatcher,
}

/// Central configuration manager
#[derive(Clone)]
pub struct ConfigManager {
    inner: Arc<Inner>,
}

fn load_state(
    loaders: &[Box<dyn SourceLoader>],
    capacity: usize,
    policy: &Arc<KeyPolicy>,
    floors: HashMap<String, u64>,
) -> Result<(EngineState, Vec<ConfigEvent>)> {
    let store = ConfigStore::with_floors(capacity, policy.clone(), floors);
    let registry = SourceRegistry::new();

    for loader in loaders {
        let bag = match loader.load() {
            Ok(bag) => bag,
            Err(e) => {
                warn!(source = loader.name(), "failed to load configuration source: {e}");
                continue;
            }
        };
        registry.extend(loader.kind(), &bag);
        merger::ingest(&store, loader.kind(), &bag)?;
    }

    let events = merger::reconcile(&store, &registry)?;
    Ok((EngineState { store, registry }, events))
}

fn guard_depth(key: &str) -> Result<()> {
    let depth = notify_depth();
    if depth >= MAX_NOTIFY_DEPTH {
        warn!(key, depth, "nested configuration write rejected");
        return Err(ConfigError::Reentrant {
            key: key.to_string(),
            depth,
        });
    }
    Ok(())
}

impl Inner {
    fn state(&self) -> Arc<EngineState> {
        self.state.load_full()
    }

    fn set(&self, key: &str, value: &str, source: ConfigSource) -> Result<Arc<ConfigItem>> {
        guard_depth(key)?;
        let write = {
            let shut_down = self.gate.read();
            if *shut_down {
                return Err(ConfigError::ShutDown);
            }
            let state = self.state();
            state.store.write(key, |current, history| {
                if let Some(existing) = current
                    && existing.read_only
                {
                    return Err(ConfigError::ReadOnly {
                        key: key.to_string(),
                    });
                }
                let attributes = state.store.next_attributes(key, current);
                let item = history.append(value, source, attributes);
                state.registry.put(source, key, value);
                Ok(item)
            })
        };

        let write = match write {
            Ok(write) => write,
            Err(e) => {
                if matches!(e, ConfigError::ReadOnly { .. }) {
                    warn!(key, %source, "write to read-only configuration key rejected");
                }
                return Err(e);
            }
        };
        debug!(
            key,
            %source,
            version = write.new.version,
            value = write.new.display_value(),
            "configuration set"
        );
        let item = write.new.clone();
        self.listeners
            .notify(&ConfigEvent::for_write(write.old, write.new));
        Ok(item)
    }

    fn remove(&self, key: &str) -> Result<Option<Arc<ConfigItem>>> {
        guard_depth(key)?;
        let removed = {
            let shut_down = self.gate.read();
            if *shut_down {
                return Err(ConfigError::ShutDown);
            }
            let state = self.state();
            state
                .store
                .remove_with(key, || state.registry.remove_everywhere(key))
        };

        if let Some(item) = &removed {
            debug!(key, version = item.version, "configuration removed");
            self.listeners.notify(&ConfigEvent::Removed {
                key: key.to_string(),
                item: item.clone(),
            });
        }
        Ok(removed)
    }

    fn rollback(&self, key: &str, version: u64) -> Result<Arc<ConfigItem>> {
        guard_depth(key)?;
        let write = {
            let shut_down = self.gate.read();
            if *shut_down {
                return Err(ConfigError::ShutDown);
            }
            let state = self.state();
            state.store.write(key, |current, history| {
                if let Some(existing) = current
                    && existing.read_only
                {
                    return Err(ConfigError::ReadOnly {
                        key: key.to_string(),
                    });
                }
                let attributes = state.store.next_attributes(key, current);
                let item = history.rollback(version, attributes).ok_or_else(|| {
                    ConfigError::VersionNotFound {
                        key: key.to_string(),
                        version,
                    }
                })?;
                state.registry.put(item.source, key, item.value.as_str());
                Ok(item)
            })?
        };

        info!(
            key,
            target = version,
            version = write.new.version,
            "configuration rolled back"
        );
        let item = write.new.clone();
        self.listeners
            .notify(&ConfigEvent::for_write(write.old, write.new));
        Ok(item)
    }

    fn reload_all(&self) -> Result<usize> {
        let events = {
            let shut_down = self.gate.write();
            if *shut_down {
                return Err(ConfigError::ShutDown);
            }
            let floors = self.state().store.last_versions();
            let (state, events) = load_state(
                &self.loaders,
                self.options.history_capacity,
                &self.policy,
                floors,
            )?;
            self.state.store(Arc::new(state));
            events
        };

        let total = self.state().store.len();
        info!(keys = total, changes = events.len(), "configuration reloaded");
        self.listeners.notify_all(&events);
        Ok(total)
    }

    fn merge_all(&self) -> Result<usize> {
        let events = {
            let shut_down = self.gate.read();
            if *shut_down {
                return Err(ConfigError::ShutDown);
            }
            let state = self.state();
            merger::reconcile(&state.store, &state.registry)?
        };
        self.listeners.notify_all(&events);
        Ok(events.len())
    }

    fn is_shut_down(&self) -> bool {
        *self.gate.read()
    }
}

impl FileReloader for Inner {
    fn reload_file(&self, path: &Path) {
        let bag = match read_file(path) {
            Ok(bag) => bag,
            Err(e) => {
                warn!(path = %path.display(), "failed to reload config file, keeping current values: {e}");
                return;
            }
        };

        let mut applied = 0;
        for (key, value) in &bag {
            match self.set(key, value, ConfigSource::File) {
                Ok(_) => applied += 1,
                Err(ConfigError::ShutDown) => return,
                Err(e) => debug!(path = %path.display(), key = key.as_str(), "reload skipped key: {e}"),
            }
        }
        info!(path = %path.display(), applied, total = bag.len(), "config file reloaded");
    }
}

impl ConfigManager {
    /// Create a new builder
    pub fn builder() -> ConfigManagerBuilder {
        ConfigManagerBuilder::new()
    }

    fn start(options: ManagerOptions, loaders: Vec<Box<dyn SourceLoader>>) -> Result<Self> {
        let policy = Arc::new(options.key_policy());
        let (state, _) = load_state(&loaders, options.history_capacity, &policy, HashMap::new())?;
        let interval = options.hot_reload_interval();
        let native_events = options.native_events;
        let keys = state.store.len();

        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let reloader: Weak<dyn FileReloader> = weak.clone();
            Inner {
                watcher: HotReloadWatcher::new(reloader, interval, native_events),
                state: ArcSwap::from_pointee(state),
                gate: RwLock::new(false),
                listeners: ListenerBus::new(),
                options,
                policy,
                loaders,
            }
        });

        for path in &inner.options.watch {
            inner.watcher.watch_file(path.clone());
        }
        if inner.options.hot_reload_enabled {
            inner.watcher.enable()?;
        }

        info!(
            keys,
            sources = inner.loaders.len(),
            "configuration manager started"
        );
        Ok(Self { inner })
    }

    /// Engine options this manager was built with
    pub fn options(&self) -> &ManagerOptions {
        &self.inner.options
    }

    // ---- reads ----

    /// Current value of `key`
    pub fn get(&self, key: &str) -> Option<String> {
        self.get_item(key).map(|item| item.value.clone())
    }

    /// Current item of `key` with all of its attributes
    pub fn get_item(&self, key: &str) -> Option<Arc<ConfigItem>> {
        self.inner.state.load().store.get(key)
    }

    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    /// Integer value, `default` when absent or not a number
    pub fn get_int(&self, key: &str, default: i32) -> i32 {
        self.parsed(key).unwrap_or(default)
    }

    pub fn get_long(&self, key: &str, default: i64) -> i64 {
        self.parsed(key).unwrap_or(default)
    }

    /// Boolean value: `true` (any case) is true, any other present value false
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get_item(key) {
            Some(item) => item.value.trim().eq_ignore_ascii_case("true"),
            None => default,
        }
    }

    /// Comma-separated list, trimmed, empty elements dropped
    pub fn get_list(&self, key: &str, default: &[&str]) -> Vec<String> {
        match self.get_item(key) {
            Some(item) => item
                .value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            None => default.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn parsed<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        let item = self.get_item(key)?;
        match item.value.trim().parse() {
            Ok(value) => Some(value),
            Err(_) => {
                debug!(key, "configuration value is not a number, using default");
                None
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.state.load().store.contains(key)
    }

    pub fn len(&self) -> usize {
        self.inner.state.load().store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All current items sorted by key
    pub fn items(&self) -> Vec<Arc<ConfigItem>> {
        self.inner.state.load().store.snapshot()
    }

    /// Sorted key/value map with sensitive values masked
    pub fn all(&self) -> BTreeMap<String, String> {
        self.items()
            .iter()
            .map(|item| (item.key.clone(), item.display_value().to_string()))
            .collect()
    }

    /// Version history of `key`, oldest first
    pub fn history(&self, key: &str) -> Vec<Arc<ConfigItem>> {
        self.inner.state.load().store.history(key)
    }

    /// What `source` currently says, unmasked
    pub fn source_values(&self, source: ConfigSource) -> RawBag {
        self.inner.state.load().registry.values(source)
    }

    pub fn summary(&self) -> ConfigSummary {
        let mut by_source: BTreeMap<ConfigSource, usize> = ConfigSource::by_priority()
            .iter()
            .map(|source| (*source, 0))
            .collect();
        let items = self.items();
        for item in &items {
            *by_source.entry(item.source).or_default() += 1;
        }
        ConfigSummary {
            total: items.len(),
            by_source,
            listeners: self.inner.listeners.len(),
            hot_reload: self.inner.watcher.is_enabled(),
            hot_reload_interval_ms: self.inner.watcher.interval().as_millis() as u64,
            watched_files: self.inner.watcher.watched_files(),
        }
    }

    // ---- writes ----

    /// Set `key` as a runtime (Memory) override
    pub fn set(&self, key: &str, value: &str) -> Result<Arc<ConfigItem>> {
        self.inner.set(key, value, ConfigSource::Memory)
    }

    /// Set `key` on behalf of `source`
    ///
    /// No priority check is applied: the write replaces the current item
    /// unless that item is read-only.
    pub fn set_with_source(
        &self,
        key: &str,
        value: &str,
        source: ConfigSource,
    ) -> Result<Arc<ConfigItem>> {
        self.inner.set(key, value, source)
    }

    /// Remove the current item of `key` from the store and every source bag
    ///
    /// History is kept. Returns the removed item, `None` if the key had none.
    pub fn remove(&self, key: &str) -> Result<Option<Arc<ConfigItem>>> {
        self.inner.remove(key)
    }

    /// Make the value of `version` current again as a new Memory version
    ///
    /// The new version keeps the key's current attributes.
    pub fn rollback(&self, key: &str, version: u64) -> Result<Arc<ConfigItem>> {
        self.inner.rollback(key, version)
    }

    /// Change description, flags or metadata of the current item
    ///
    /// No version is added and no event is fired. This is the only way to make
    /// a read-only key writable again.
    pub fn set_attributes(
        &self,
        key: &str,
        attributes: ItemAttributes,
    ) -> Result<Option<Arc<ConfigItem>>> {
        let shut_down = self.inner.gate.read();
        if *shut_down {
            return Err(ConfigError::ShutDown);
        }
        Ok(self.inner.state().store.set_attributes(key, attributes))
    }

    /// Re-run the priority-checked reconcile over the current source bags
    ///
    /// Returns the number of accepted candidates.
    pub fn merge_all(&self) -> Result<usize> {
        self.inner.merge_all()
    }

    /// Rebuild everything from the sources
    ///
    /// Store, histories and bags are replaced as a whole; per-key version
    /// numbers continue where they left off. Returns the number of keys.
    pub fn reload_all(&self) -> Result<usize> {
        self.inner.reload_all()
    }

    // ---- listeners ----

    pub fn add_listener(&self, listener: impl ConfigListener + 'static) -> ListenerId {
        self.inner.listeners.add(Arc::new(listener))
    }

    pub fn add_shared_listener(&self, listener: Arc<dyn ConfigListener>) -> ListenerId {
        self.inner.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.listeners.remove(id)
    }

    // ---- hot reload ----

    pub fn enable_hot_reload(&self) -> Result<()> {
        let shut_down = self.inner.gate.read();
        if *shut_down {
            return Err(ConfigError::ShutDown);
        }
        self.inner.watcher.enable()
    }

    pub fn disable_hot_reload(&self) {
        self.inner.watcher.disable();
    }

    pub fn is_hot_reload_enabled(&self) -> bool {
        self.inner.watcher.is_enabled()
    }

    /// Change the polling interval; a running poller is restarted
    pub fn set_hot_reload_interval(&self, interval: Duration) -> Result<()> {
        self.inner.watcher.set_interval(interval)
    }

    pub fn watch_file(&self, path: impl Into<PathBuf>) -> Result<()> {
        let shut_down = self.inner.gate.read();
        if *shut_down {
            return Err(ConfigError::ShutDown);
        }
        self.inner.watcher.watch_file(path);
        Ok(())
    }

    pub fn unwatch_file(&self, path: impl AsRef<Path>) -> bool {
        self.inner.watcher.unwatch_file(path.as_ref())
    }

    pub fn watched_files(&self) -> Vec<PathBuf> {
        self.inner.watcher.watched_files()
    }

    /// Check every watched file once on the calling thread
    pub fn poll_watched_files(&self) -> Vec<PathBuf> {
        self.inner.watcher.poll_once()
    }

    // ---- import / export ----

    /// Write the current items as a properties file
    ///
    /// Sensitive items are left out unless `include_sensitive` is set.
    /// Returns the number of items written.
    pub fn export_configs(&self, path: impl AsRef<Path>, include_sensitive: bool) -> Result<usize> {
        let path = path.as_ref();
        let items: Vec<Arc<ConfigItem>> = self
            .items()
            .into_iter()
            .filter(|item| include_sensitive || !item.sensitive)
            .collect();

        let mut out = BufWriter::new(File::create(path)?);
        writeln!(out, "# Configuration export")?;
        writeln!(out, "# exported: {}", format_timestamp(OffsetDateTime::now_utc()))?;
        writeln!(out, "# items: {}", items.len())?;
        for item in &items {
            writeln!(out)?;
            writeln!(
                out,
                "# source: {}, version: {}, timestamp: {}",
                item.source,
                item.version,
                format_timestamp(item.timestamp)
            )?;
            if let Some(description) = &item.description {
                for line in description.lines() {
                    writeln!(out, "# {line}")?;
                }
            }
            writeln!(
                out,
                "{}={}",
                escape_property(&item.key),
                escape_property(&item.value)
            )?;
        }
        out.flush()?;

        info!(path = %path.display(), items = items.len(), include_sensitive, "configuration exported");
        Ok(items.len())
    }

    /// Apply a properties or TOML file key by key as File writes
    ///
    /// With `overwrite` off, keys that already have a value are skipped.
    /// Failed keys are counted and do not stop the import.
    pub fn import_configs(&self, path: impl AsRef<Path>, overwrite: bool) -> Result<ImportReport> {
        let path = path.as_ref();
        let bag = read_file(path)?;
        let mut report = ImportReport::default();

        for (key, value) in &bag {
            if !overwrite && self.contains(key) {
                report.skipped += 1;
                continue;
            }
            match self.inner.set(key, value, ConfigSource::File) {
                Ok(_) => report.imported += 1,
                Err(ConfigError::ShutDown) => return Err(ConfigError::ShutDown),
                Err(e) => {
                    warn!(key = key.as_str(), "import rejected key: {e}");
                    report.rejected += 1;
                }
            }
        }

        info!(
            path = %path.display(),
            imported = report.imported,
            skipped = report.skipped,
            rejected = report.rejected,
            "configuration imported"
        );
        Ok(report)
    }

    // ---- lifecycle ----

    /// Stop hot reload, drop every watch task and refuse further mutation
    ///
    /// Idempotent. Reads keep returning the last committed state.
    pub fn shutdown(&self) {
        {
            let mut shut_down = self.inner.gate.write();
            if !*shut_down {
                *shut_down = true;
                info!("configuration manager shut down");
            }
        }
        // Once the flag is set no caller can start the poller again
        self.inner.watcher.shutdown();
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.is_shut_down()
    }
}

impl std::fmt::Debug for ConfigManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigManager")
            .field("items", &self.len())
            .field("listeners", &self.inner.listeners)
            .field("watcher", &self.inner.watcher)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

fn format_timestamp(timestamp: OffsetDateTime) -> String {
    timestamp
        .format(&Rfc3339)
        .unwrap_or_else(|_| timestamp.to_string())
}
