use std::path::PathBuf;

use strata_config::{ConfigManager, ConfigSource, RawBag, Result, SourceLoader};

struct StaticLoader {
    kind: ConfigSource,
    entries: RawBag,
}

impl StaticLoader {
    fn boxed(kind: ConfigSource, entries: &[(&str, &str)]) -> Box<dyn SourceLoader> {
        Box::new(Self {
            kind,
            entries: entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        })
    }
}

impl SourceLoader for StaticLoader {
    fn kind(&self) -> ConfigSource {
        self.kind
    }

    fn name(&self) -> &str {
        "static"
    }

    fn load(&self) -> Result<RawBag> {
        Ok(self.entries.clone())
    }
}

fn loaders() -> Vec<Box<dyn SourceLoader>> {
    vec![
        StaticLoader::boxed(ConfigSource::Database, &[("shared", "database"), ("db.only", "1")]),
        StaticLoader::boxed(ConfigSource::File, &[("shared", "file"), ("file.only", "1")]),
        StaticLoader::boxed(ConfigSource::Environment, &[("shared", "environment")]),
        StaticLoader::boxed(ConfigSource::CommandLine, &[("cli.only", "1")]),
    ]
}

fn build(order: &[usize]) -> ConfigManager {
    let mut available: Vec<Option<Box<dyn SourceLoader>>> = loaders().into_iter().map(Some).collect();
    let mut builder = ConfigManager::builder()
        .with_files(Vec::<PathBuf>::new())
        .with_env_vars(Vec::<(String, String)>::new())
        .with_database(RawBag::new());
    for &index in order {
        let loader = available[index].take().expect("loader used twice");
        builder = builder.with_loader(loader);
    }
    builder.build().unwrap()
}

#[test]
fn higher_priority_wins_regardless_of_load_order() {
    let orders: [[usize; 4]; 4] = [[0, 1, 2, 3], [3, 2, 1, 0], [2, 0, 3, 1], [1, 3, 0, 2]];
    for order in orders {
        let manager = build(&order);
        manager.reload_all().unwrap();

        let shared = manager.get_item("shared").unwrap();
        assert_eq!(shared.value, "environment", "load order {order:?}");
        assert_eq!(shared.source, ConfigSource::Environment);
        assert_eq!(manager.get("db.only").as_deref(), Some("1"));
        assert_eq!(manager.get("file.only").as_deref(), Some("1"));
        assert_eq!(
            manager.get_item("cli.only").unwrap().source,
            ConfigSource::CommandLine
        );
    }
}

#[test]
fn file_then_environment_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("application.properties");
    std::fs::write(&path, "server.port=8080\n").unwrap();

    let manager = ConfigManager::builder()
        .with_file(&path)
        .with_env_vars([("APP_SERVER_PORT", "9090")])
        .with_database(RawBag::new())
        .build()
        .unwrap();
    manager.reload_all().unwrap();

    assert_eq!(manager.get("server.port").as_deref(), Some("9090"));
    assert_eq!(
        manager
            .source_values(ConfigSource::File)
            .get("server.port")
            .map(String::as_str),
        Some("8080")
    );
}

#[test]
fn command_line_overrides_everything() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("application.toml");
    std::fs::write(&path, "[web]\nport = 8080\n").unwrap();

    let manager = ConfigManager::builder()
        .with_file(&path)
        .with_env_vars([("APP_WEB_PORT", "9090")])
        .with_database([("web.port".to_string(), "7070".to_string())].into())
        .with_args(["strata", "--web.port=6060", "-Dweb.host=localhost"])
        .build()
        .unwrap();

    assert_eq!(manager.get("web.port").as_deref(), Some("6060"));
    assert_eq!(manager.get("web.host").as_deref(), Some("localhost"));
}

#[test]
fn reload_discards_runtime_overrides() {
    let manager = build(&[0, 1, 2, 3]);
    manager.set("shared", "memory").unwrap();
    assert_eq!(manager.get("shared").as_deref(), Some("memory"));

    manager.reload_all().unwrap();
    assert_eq!(manager.get("shared").as_deref(), Some("environment"));
}

#[test]
fn reload_delivers_only_reconcile_events() {
    let manager = build(&[2, 1, 0, 3]);
    let events = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = events.clone();
    manager.add_listener(move |event: &strata_config::ConfigEvent| -> anyhow::Result<()> {
        sink.lock().push(event.key().to_string());
        Ok(())
    });

    manager.reload_all().unwrap();
    // ingest leaves the database value on top, reconcile restores environment
    assert_eq!(*events.lock(), vec!["shared"]);
}
