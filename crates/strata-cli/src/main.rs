mod cli;
mod observability;
mod output;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use serde_json::json;
use strata_config::{AppSettings, ConfigEvent, ConfigManager, ManagerOptions, WebSettings};

use cli::{Cli, Commands};
use output::print_error;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    observability::init_tracing_with_level(&cli.log_level);
    let format = cli.format.unwrap_or_default();

    let manager = build_manager(&cli)?;
    manager.add_listener(observability::LogLevelListener);
    if let Some(level) = manager.get(observability::LOG_LEVEL_KEY)
        && std::env::var_os("RUST_LOG").is_none()
        && let Err(e) = observability::apply_logging_level(&level)
    {
        tracing::warn!(level = %level, "ignoring configured log level: {e}");
    }

    let outcome = execute(&cli, &manager, format).await;
    manager.shutdown();
    outcome
}

fn build_manager(cli: &Cli) -> Result<ConfigManager> {
    let options = match &cli.options {
        Some(path) => ManagerOptions::load(path)
            .with_context(|| format!("failed to load options from {}", path.display()))?,
        None => ManagerOptions::default(),
    };

    let mut builder = ConfigManager::builder().with_options(options);
    if !cli.files.is_empty() {
        builder = builder.with_files(cli.files.iter().cloned());
    }
    if let Some(prefix) = &cli.env_prefix {
        builder = builder.with_environment(prefix.clone());
    }
    if !cli.defines.is_empty() {
        builder = builder.with_args(cli.defines.iter().map(|d| format!("--{d}")));
    }
    Ok(builder.build()?)
}

async fn execute(cli: &Cli, manager: &ConfigManager, format: cli::OutputFormat) -> Result<()> {
    match &cli.command {
        Commands::Show(args) => {
            let summary = manager.summary();
            match format {
                cli::OutputFormat::Json => {
                    let mut value = json!({ "summary": summary });
                    if !args.summary {
                        value["items"] = json!(manager.all());
                        value["app"] = json!(AppSettings::from_manager(manager));
                        value["web"] = json!(WebSettings::from_manager(manager));
                    }
                    output::print_json(&value)?;
                }
                cli::OutputFormat::Text => {
                    if !args.summary {
                        output::print_items(&manager.items(), format)?;
                        println!();
                    }
                    println!("{summary}");
                }
            }
        }
        Commands::Get(args) => {
            let item = manager
                .get_item(&args.key)
                .with_context(|| format!("key '{}' is not set", args.key))?;
            match format {
                cli::OutputFormat::Json => {
                    output::print_json(&output::item_json(&item, args.reveal))?;
                }
                cli::OutputFormat::Text => {
                    let value = if args.reveal {
                        item.value.as_str()
                    } else {
                        item.display_value()
                    };
                    println!("{value}");
                }
            }
        }
        Commands::Set(args) => {
            let item = manager.set(&args.key, &args.value)?;
            output::print_success(&format!(
                "Set {} = {} (version {})",
                item.key,
                item.display_value(),
                item.version
            ));
        }
        Commands::History(args) => {
            output::print_history(&args.key, &manager.history(&args.key), format)?;
        }
        Commands::Rollback(args) => {
            let item = manager.rollback(&args.key, args.version)?;
            output::print_success(&format!(
                "Rolled {} back to version {}: {} (now version {})",
                item.key,
                args.version,
                item.display_value(),
                item.version
            ));
        }
        Commands::Export(args) => {
            let count = manager.export_configs(&args.path, args.include_sensitive)?;
            output::print_success(&format!(
                "Exported {count} items to {}",
                args.path.display()
            ));
        }
        Commands::Import(args) => {
            let report = manager.import_configs(&args.path, args.overwrite)?;
            match format {
                cli::OutputFormat::Json => output::print_json(&json!(report))?,
                cli::OutputFormat::Text => output::print_success(&format!(
                    "Imported {} keys ({} skipped, {} rejected)",
                    report.imported, report.skipped, report.rejected
                )),
            }
        }
        Commands::Watch(args) => {
            let paths = if args.paths.is_empty() {
                manager.options().files.clone()
            } else {
                args.paths.clone()
            };
            for path in &paths {
                manager.watch_file(path.clone())?;
            }
            if let Some(ms) = args.interval_ms {
                manager.set_hot_reload_interval(Duration::from_millis(ms))?;
            }
            manager.add_listener(|event: &ConfigEvent| -> anyhow::Result<()> {
                output::print_event(event);
                Ok(())
            });
            manager.enable_hot_reload()?;

            println!(
                "{} {} file(s), press Ctrl-C to stop",
                "Watching".cyan(),
                paths.len()
            );
            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for Ctrl-C")?;
            manager.disable_hot_reload();
        }
    }

    Ok(())
}
