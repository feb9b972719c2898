//! Hot reload of watched files
//!
//! A background thread polls every active watch task on a fixed interval and
//! compares the file's modification time with the last one seen. Changed files
//! are handed to a [`FileReloader`], which re-reads them and writes each key
//! through the regular set path.
//!
//! With native events enabled, a debounced filesystem watcher wakes the poller
//! early. The modification time check still decides whether a file reloads.
//!
//! A file that disappears counts as unchanged until it reappears with a newer
//! modification time.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{DebounceEventResult, Debouncer, new_debouncer};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::sources::modified_time;
use crate::{ConfigError, Result};

/// Debounce window for native filesystem events
const NATIVE_DEBOUNCE: Duration = Duration::from_millis(200);

/// Applies the content of a changed file
pub trait FileReloader: Send + Sync {
    fn reload_file(&self, path: &Path);
}

/// Polling state of one watched file
#[derive(Debug, Clone, PartialEq)]
pub struct WatchTask {
    pub path: PathBuf,
    pub last_modified: Option<SystemTime>,
    pub active: bool,
}

impl WatchTask {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            last_modified: modified_time(&path),
            path,
            active: true,
        }
    }

    /// Record a newer modification time, returns true if the file changed
    pub fn check(&mut self) -> bool {
        if !self.active {
            return false;
        }
        match modified_time(&self.path) {
            Some(current) if self.last_modified.is_none_or(|last| current > last) => {
                self.last_modified = Some(current);
                true
            }
            _ => false,
        }
    }
}

enum Control {
    Stop,
    Touched,
}

type Tasks = Arc<Mutex<BTreeMap<PathBuf, WatchTask>>>;

struct Poller {
    handle: JoinHandle<()>,
    control: mpsc::Sender<Control>,
    native: Option<NativeEvents>,
}

struct NativeEvents {
    debouncer: Debouncer<RecommendedWatcher>,
    dirs: HashSet<PathBuf>,
}

impl NativeEvents {
    fn start(control: mpsc::Sender<Control>) -> Result<Self> {
        let debouncer = new_debouncer(NATIVE_DEBOUNCE, move |res: DebounceEventResult| {
            match res {
                Ok(events) if !events.is_empty() => {
                    let _ = control.send(Control::Touched);
                }
                Ok(_) => {}
                Err(e) => warn!("file notification error: {e:?}"),
            }
        })
        .map_err(|e| ConfigError::watcher(format!("failed to create file watcher: {e}")))?;
        Ok(Self {
            debouncer,
            dirs: HashSet::new(),
        })
    }

    fn watch(&mut self, file: &Path) {
        let dir = match file.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if self.dirs.contains(&dir) {
            return;
        }
        match self.debouncer.watcher().watch(&dir, RecursiveMode::NonRecursive) {
            Ok(()) => {
                debug!(dir = %dir.display(), "watching directory for file events");
                self.dirs.insert(dir);
            }
            Err(e) => warn!(dir = %dir.display(), "native watch failed, polling only: {e}"),
        }
    }
}

/// Periodic watcher driving hot reload
pub struct HotReloadWatcher {
    tasks: Tasks,
    interval: Mutex<Duration>,
    native_events: bool,
    poller: Mutex<Option<Poller>>,
    reloader: Weak<dyn FileReloader>,
}

impl HotReloadWatcher {
    pub fn new(reloader: Weak<dyn FileReloader>, interval: Duration, native_events: bool) -> Self {
        Self {
            tasks: Arc::new(Mutex::new(BTreeMap::new())),
            interval: Mutex::new(interval),
            native_events,
            poller: Mutex::new(None),
            reloader,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.poller.lock().is_some()
    }

    pub fn interval(&self) -> Duration {
        *self.interval.lock()
    }

    /// Start the poller thread; no-op if already running
    pub fn enable(&self) -> Result<()> {
        let mut poller = self.poller.lock();
        if poller.is_some() {
            return Ok(());
        }

        let interval = self.interval();
        let (control, rx) = mpsc::channel();
        let native = if self.native_events {
            match NativeEvents::start(control.clone()) {
                Ok(mut native) => {
                    for path in self.tasks.lock().keys() {
                        native.watch(path);
                    }
                    Some(native)
                }
                Err(e) => {
                    warn!("{e}, falling back to polling");
                    None
                }
            }
        } else {
            None
        };

        let tasks = self.tasks.clone();
        let reloader = self.reloader.clone();
        let handle = thread::Builder::new()
            .name("strata-hot-reload".to_string())
            .spawn(move || run_poller(rx, tasks, interval, reloader))?;

        *poller = Some(Poller {
            handle,
            control,
            native,
        });
        info!(interval_ms = interval.as_millis() as u64, "hot reload enabled");
        Ok(())
    }

    /// Stop the poller; an in-flight reload finishes first
    ///
    /// When called from the poller thread itself the thread is only signalled.
    pub fn disable(&self) {
        let Some(poller) = self.poller.lock().take() else {
            return;
        };
        let _ = poller.control.send(Control::Stop);
        drop(poller.native);
        if poller.handle.thread().id() != thread::current().id() && poller.handle.join().is_err() {
            warn!("hot reload thread panicked");
        }
        info!("hot reload disabled");
    }

    /// Change the polling interval, restarting the poller if it runs
    pub fn set_interval(&self, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(ConfigError::validation("hot reload interval must be > 0"));
        }
        *self.interval.lock() = interval;
        if self.is_enabled() {
            self.disable();
            self.enable()?;
        }
        Ok(())
    }

    /// Register a file; the current modification time becomes the baseline
    pub fn watch_file(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        {
            let mut tasks = self.tasks.lock();
            if tasks.contains_key(&path) {
                return;
            }
            tasks.insert(path.clone(), WatchTask::new(path.clone()));
        }
        if let Some(native) = self.poller.lock().as_mut().and_then(|p| p.native.as_mut()) {
            native.watch(&path);
        }
        info!(path = %path.display(), "watching config file");
    }

    /// Stop watching a file, returns false if it was not watched
    pub fn unwatch_file(&self, path: &Path) -> bool {
        match self.tasks.lock().remove(path) {
            Some(mut task) => {
                task.active = false;
                info!(path = %path.display(), "stopped watching config file");
                true
            }
            None => false,
        }
    }

    pub fn watched_files(&self) -> Vec<PathBuf> {
        self.tasks.lock().keys().cloned().collect()
    }

    /// Run one polling pass on the calling thread, returns the reloaded files
    pub fn poll_once(&self) -> Vec<PathBuf> {
        poll(&self.tasks, &self.reloader)
    }

    /// Stop the poller and drop every watch task
    pub fn shutdown(&self) {
        self.disable();
        let mut tasks = self.tasks.lock();
        for task in tasks.values_mut() {
            task.active = false;
        }
        tasks.clear();
    }
}

impl Drop for HotReloadWatcher {
    fn drop(&mut self) {
        self.disable();
    }
}

impl std::fmt::Debug for HotReloadWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HotReloadWatcher")
            .field("enabled", &self.is_enabled())
            .field("interval", &self.interval())
            .field("native_events", &self.native_events)
            .field("tasks", &self.tasks.lock().len())
            .finish()
    }
}

fn run_poller(
    rx: mpsc::Receiver<Control>,
    tasks: Tasks,
    interval: Duration,
    reloader: Weak<dyn FileReloader>,
) {
    debug!("hot reload poller started");
    loop {
        match rx.recv_timeout(interval) {
            Ok(Control::Stop) | Err(RecvTimeoutError::Disconnected) => break,
            Ok(Control::Touched) | Err(RecvTimeoutError::Timeout) => {}
        }
        if reloader.strong_count() == 0 {
            break;
        }
        poll(&tasks, &reloader);
    }
    debug!("hot reload poller stopped");
}

fn poll(tasks: &Tasks, reloader: &Weak<dyn FileReloader>) -> Vec<PathBuf> {
    // Reloads run without the task lock so listeners may (un)watch files
    let changed: Vec<PathBuf> = tasks
        .lock()
        .values_mut()
        .filter_map(|task| task.check().then(|| task.path.clone()))
        .collect();
    if changed.is_empty() {
        return changed;
    }
    let Some(reloader) = reloader.upgrade() else {
        return Vec::new();
    };
    for path in &changed {
        info!(path = %path.display(), "config file changed");
        reloader.reload_file(path);
    }
    changed
}
