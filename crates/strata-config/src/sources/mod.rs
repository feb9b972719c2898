//! Configuration sources
//!
//! Each loader produces the raw key/value bag of one source kind:
//! - File: property and TOML files
//! - Environment: prefixed process environment variables
//! - Database: a static bag supplied by the database collaborator
//! - CommandLine: `--key=value` style arguments
//!
//! The Memory source has no loader; its bag is filled by runtime writes.

mod command_line;
mod database;
mod environment;
mod file;

pub use command_line::CommandLineSource;
pub use database::DatabaseSource;
pub use environment::EnvironmentSource;
pub use file::{
    FileFormat, FileSource, escape_property, modified_time, parse_properties, parse_toml, read_file,
};

use crate::Result;
use crate::events::ConfigSource;
use crate::merger::RawBag;

/// Trait for configuration sources
pub trait SourceLoader: Send + Sync {
    /// Source kind the loaded values are tagged with
    fn kind(&self) -> ConfigSource;

    /// Name of this loader (for logging and debugging)
    fn name(&self) -> &str;

    /// Load the current content of this source
    fn load(&self) -> Result<RawBag>;
}
