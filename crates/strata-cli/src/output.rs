use std::sync::Arc;

use colored::Colorize;
use serde_json::{Value, json};
use strata_config::{ConfigEvent, ConfigItem, ConfigSource};
use tabled::builder::Builder;
use tabled::settings::Style;

use crate::cli::OutputFormat;

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

pub fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// JSON form of an item, sensitive values masked unless `reveal`
pub fn item_json(item: &ConfigItem, reveal: bool) -> Value {
    let value = if reveal {
        item.value.as_str()
    } else {
        item.display_value()
    };
    json!({
        "key": item.key,
        "value": value,
        "source": item.source,
        "version": item.version,
        "timestamp": item.timestamp.to_string(),
        "description": item.description,
        "sensitive": item.sensitive,
        "read_only": item.read_only,
    })
}

fn source_label(source: ConfigSource) -> colored::ColoredString {
    let label = source.to_string();
    match source {
        ConfigSource::CommandLine => label.magenta(),
        ConfigSource::Environment => label.yellow(),
        ConfigSource::Memory => label.cyan(),
        ConfigSource::File => label.green(),
        ConfigSource::Database => label.blue(),
    }
}

fn flags(item: &ConfigItem) -> String {
    let mut flags = Vec::new();
    if item.read_only {
        flags.push("read-only");
    }
    if item.sensitive {
        flags.push("sensitive");
    }
    flags.join(", ")
}

fn items_table(items: &[Arc<ConfigItem>]) -> String {
    let mut builder = Builder::default();
    builder.push_record(["Key", "Value", "Source", "Version", "Flags"]);
    for item in items {
        builder.push_record([
            item.key.clone(),
            item.display_value().to_string(),
            item.source.to_string(),
            item.version.to_string(),
            flags(item),
        ]);
    }
    builder.build().with(Style::rounded()).to_string()
}

fn history_table(history: &[Arc<ConfigItem>]) -> String {
    let mut builder = Builder::default();
    builder.push_record(["Version", "Value", "Source", "Timestamp"]);
    for item in history {
        builder.push_record([
            item.version.to_string(),
            item.display_value().to_string(),
            item.source.to_string(),
            item.timestamp.to_string(),
        ]);
    }
    builder.build().with(Style::rounded()).to_string()
}

pub fn print_items(items: &[Arc<ConfigItem>], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            let values: Vec<Value> = items.iter().map(|i| item_json(i, false)).collect();
            print_json(&Value::Array(values))
        }
        OutputFormat::Text => {
            if items.is_empty() {
                println!("No configuration found.");
            } else {
                println!("{}", items_table(items));
            }
            Ok(())
        }
    }
}

pub fn print_history(
    key: &str,
    history: &[Arc<ConfigItem>],
    format: OutputFormat,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            let values: Vec<Value> = history.iter().map(|i| item_json(i, false)).collect();
            print_json(&json!({ "key": key, "versions": values }))
        }
        OutputFormat::Text => {
            if history.is_empty() {
                println!("No history for {}", key.bold());
            } else {
                println!("{} {}", "History of".cyan(), key.bold());
                println!("{}", history_table(history));
            }
            Ok(())
        }
    }
}

pub fn print_event(event: &ConfigEvent) {
    match event {
        ConfigEvent::Added { key, item } => {
            println!("{} {} = {}", "+".green(), key.bold(), item.display_value());
        }
        ConfigEvent::Updated { key, old, new } => {
            println!(
                "{} {} = {} {} {} ({})",
                "~".yellow(),
                key.bold(),
                old.display_value(),
                "→".dimmed(),
                new.display_value(),
                source_label(new.source)
            );
        }
        ConfigEvent::Removed { key, .. } => {
            println!("{} {}", "-".red(), key.bold());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_config::ItemAttributes;

    fn item(key: &str, value: &str, version: u64) -> Arc<ConfigItem> {
        Arc::new(ConfigItem::new(key, value, ConfigSource::File, version))
    }

    #[test]
    fn test_items_table_masks_and_flags() {
        let secret = Arc::new(
            ConfigItem::new("db.password", "hunter2", ConfigSource::Environment, 3)
                .with_attributes(ItemAttributes::new().sensitive(true).read_only(true)),
        );
        let table = items_table(&[item("server.port", "8080", 1), secret]);

        assert!(table.contains("server.port"));
        assert!(table.contains("8080"));
        assert!(table.contains("read-only, sensitive"));
        assert!(!table.contains("hunter2"));
        assert!(table.starts_with('╭'));
    }

    #[test]
    fn test_history_table_lists_every_version() {
        let table = history_table(&[item("a", "one", 1), item("a", "two", 2)]);
        assert!(table.contains("Version"));
        assert!(table.contains("one"));
        assert!(table.contains("two"));
        assert_eq!(table.lines().filter(|l| l.contains(" file ")).count(), 2);
    }
}
