//! Database configuration source
//!
//! The database collaborator hands over a static key/value bag at startup;
//! no live query contract exists.

use crate::Result;
use crate::events::ConfigSource;
use crate::merger::RawBag;
use crate::sources::SourceLoader;

/// Static database-backed source
#[derive(Debug, Clone, Default)]
pub struct DatabaseSource {
    entries: RawBag,
}

impl DatabaseSource {
    pub fn new(entries: RawBag) -> Self {
        Self { entries }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for DatabaseSource {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl SourceLoader for DatabaseSource {
    fn kind(&self) -> ConfigSource {
        ConfigSource::Database
    }

    fn name(&self) -> &str {
        "database"
    }

    fn load(&self) -> Result<RawBag> {
        Ok(self.entries.clone())
    }
}
