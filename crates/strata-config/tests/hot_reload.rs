use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use filetime::{FileTime, set_file_mtime};
use parking_lot::Mutex;
use strata_config::{ConfigEvent, ConfigManager, ConfigSource, ItemAttributes, RawBag};
use tempfile::TempDir;

fn bump(path: &Path, secs: i64) {
    set_file_mtime(path, FileTime::from_unix_time(1_700_000_000 + secs, 0)).unwrap();
}

fn write(path: &Path, content: &str, secs: i64) {
    std::fs::write(path, content).unwrap();
    bump(path, secs);
}

fn manager(file: &Path) -> ConfigManager {
    let manager = ConfigManager::builder()
        .with_file(file)
        .with_env_vars(Vec::<(String, String)>::new())
        .with_database(RawBag::new())
        .build()
        .unwrap();
    manager.watch_file(file).unwrap();
    manager
}

#[test]
fn changed_file_is_applied_through_set() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("application.properties");
    write(&path, "server.port=8080\nserver.host=localhost\n", 0);
    let manager = manager(&path);

    write(&path, "server.port=9000\nserver.host=localhost\n", 10);
    assert_eq!(manager.poll_watched_files(), vec![path.clone()]);

    let port = manager.get_item("server.port").unwrap();
    assert_eq!(port.value, "9000");
    assert_eq!(port.source, ConfigSource::File);
    assert_eq!(port.version, 2);
    // unchanged values are written again as new versions
    assert_eq!(manager.history("server.host").len(), 2);
    assert!(manager.poll_watched_files().is_empty());
}

#[test]
fn read_only_keys_survive_reload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("application.properties");
    write(&path, "app.version=1.0.0\napp.name=strata\n", 0);
    let manager = manager(&path);
    manager
        .set_attributes("app.version", ItemAttributes::new().read_only(true))
        .unwrap();

    write(&path, "app.version=2.0.0\napp.name=renamed\n", 10);
    manager.poll_watched_files();

    assert_eq!(manager.get("app.version").as_deref(), Some("1.0.0"));
    assert_eq!(manager.get("app.name").as_deref(), Some("renamed"));
}

#[test]
fn broken_file_keeps_current_values() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("application.properties");
    write(&path, "server.port=8080\n", 0);
    let manager = manager(&path);

    write(&path, "server.port=9000\nthis line is broken\n", 10);
    manager.poll_watched_files();
    assert_eq!(manager.get("server.port").as_deref(), Some("8080"));
    assert_eq!(manager.history("server.port").len(), 1);

    write(&path, "server.port=9000\n", 20);
    manager.poll_watched_files();
    assert_eq!(manager.get("server.port").as_deref(), Some("9000"));
}

#[test]
fn deleted_file_is_no_change() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("application.properties");
    write(&path, "server.port=8080\n", 0);
    let manager = manager(&path);

    std::fs::remove_file(&path).unwrap();
    assert!(manager.poll_watched_files().is_empty());
    assert_eq!(manager.get("server.port").as_deref(), Some("8080"));

    write(&path, "server.port=9000\n", 30);
    assert_eq!(manager.poll_watched_files().len(), 1);
    assert_eq!(manager.get("server.port").as_deref(), Some("9000"));
}

#[test]
fn unwatched_file_is_ignored() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("application.properties");
    write(&path, "server.port=8080\n", 0);
    let manager = manager(&path);

    assert!(manager.unwatch_file(&path));
    write(&path, "server.port=9000\n", 10);
    assert!(manager.poll_watched_files().is_empty());
    assert_eq!(manager.get("server.port").as_deref(), Some("8080"));
}

#[test]
fn poller_thread_notifies_listeners() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("application.properties");
    write(&path, "server.port=8080\n", 0);
    let manager = manager(&path);

    let threads = Arc::new(Mutex::new(Vec::new()));
    let sink = threads.clone();
    manager.add_listener(move |event: &ConfigEvent| -> anyhow::Result<()> {
        if event.key() == "server.port" {
            let name = thread::current().name().map(String::from);
            sink.lock().push(name);
        }
        Ok(())
    });

    manager
        .set_hot_reload_interval(Duration::from_millis(25))
        .unwrap();
    manager.enable_hot_reload().unwrap();
    write(&path, "server.port=9000\n", 10);

    let mut applied = false;
    for _ in 0..200 {
        thread::sleep(Duration::from_millis(10));
        if manager.get("server.port").as_deref() == Some("9000") {
            applied = true;
            break;
        }
    }
    manager.disable_hot_reload();
    assert!(applied, "hot reload did not apply within timeout");
    assert_eq!(
        threads.lock().first().cloned().flatten().as_deref(),
        Some("strata-hot-reload")
    );
}

#[test]
fn shutdown_stops_watching() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("application.properties");
    write(&path, "server.port=8080\n", 0);
    let manager = manager(&path);
    manager.enable_hot_reload().unwrap();

    manager.shutdown();
    assert!(!manager.is_hot_reload_enabled());
    assert!(manager.watched_files().is_empty());

    write(&path, "server.port=9000\n", 10);
    assert!(manager.poll_watched_files().is_empty());
    assert_eq!(manager.get("server.port").as_deref(), Some("8080"));
}

#[test]
fn watch_paths_from_options() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("application.properties");
    write(&path, "a=1\n", 0);

    let options = strata_config::ManagerOptions {
        files: vec![path.clone()],
        watch: vec![path.clone()],
        database: RawBag::new(),
        ..Default::default()
    };
    let manager = ConfigManager::builder()
        .with_options(options)
        .with_env_vars(Vec::<(String, String)>::new())
        .build()
        .unwrap();

    assert_eq!(manager.watched_files(), vec![PathBuf::from(&path)]);
    assert!(!manager.is_hot_reload_enabled());
}
