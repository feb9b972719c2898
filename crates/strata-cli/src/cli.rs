use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Inspect and change layered application configuration")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Engine options file (TOML)
    #[arg(short, long, global = true, env = "STRATA_OPTIONS")]
    pub options: Option<PathBuf>,

    /// Configuration file, repeatable; replaces the default file list
    #[arg(short, long = "file", global = true)]
    pub files: Vec<PathBuf>,

    /// Environment variable prefix
    #[arg(long, global = true, env = "STRATA_ENV_PREFIX")]
    pub env_prefix: Option<String>,

    /// Command line override (e.g. -D server.port=9090), repeatable
    #[arg(short = 'D', long = "define", global = true, value_name = "KEY=VALUE")]
    pub defines: Vec<String>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, env = "STRATA_LOG", default_value = "warn")]
    pub log_level: String,

    /// Output format
    #[arg(long, global = true)]
    pub format: Option<OutputFormat>,
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show every resolved key with its winning source
    Show(ShowArgs),
    /// Read one key
    Get(GetArgs),
    /// Set a key as a runtime override and show the resulting item
    Set(SetArgs),
    /// Show the version history of a key
    History(KeyArgs),
    /// Roll a key back to an earlier version
    Rollback(RollbackArgs),
    /// Write the resolved configuration to a properties file
    Export(ExportArgs),
    /// Apply a properties or TOML file
    Import(ImportArgs),
    /// Watch files and print changes until interrupted
    Watch(WatchArgs),
}

#[derive(clap::Args)]
pub struct ShowArgs {
    /// Print the summary only
    #[arg(long)]
    pub summary: bool,
}

#[derive(clap::Args)]
pub struct KeyArgs {
    /// Configuration key (e.g. server.port)
    pub key: String,
}

#[derive(clap::Args)]
pub struct GetArgs {
    /// Configuration key (e.g. server.port)
    pub key: String,
    /// Print sensitive values in clear
    #[arg(long)]
    pub reveal: bool,
}

#[derive(clap::Args)]
pub struct SetArgs {
    pub key: String,
    pub value: String,
}

#[derive(clap::Args)]
pub struct RollbackArgs {
    pub key: String,
    /// Version to restore
    pub version: u64,
}

#[derive(clap::Args)]
pub struct ExportArgs {
    /// Destination file
    pub path: PathBuf,
    /// Include sensitive values
    #[arg(long)]
    pub include_sensitive: bool,
}

#[derive(clap::Args)]
pub struct ImportArgs {
    /// Source file (.properties or .toml)
    pub path: PathBuf,
    /// Replace keys that already have a value
    #[arg(long)]
    pub overwrite: bool,
}

#[derive(clap::Args)]
pub struct WatchArgs {
    /// Files to watch; defaults to the configured file list
    pub paths: Vec<PathBuf>,
    /// Polling interval in milliseconds
    #[arg(long)]
    pub interval_ms: Option<u64>,
}
