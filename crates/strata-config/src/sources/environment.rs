//! Environment variable configuration source
//!
//! Variables starting with the prefix are mapped to dotted lowercase keys:
//! `APP_SERVER_PORT` becomes `server.port`.

use crate::Result;
use crate::events::ConfigSource;
use crate::merger::RawBag;
use crate::sources::SourceLoader;

/// Prefixed environment source
#[derive(Debug, Clone)]
pub struct EnvironmentSource {
    prefix: String,
    /// Fixed snapshot used instead of the process environment
    vars: Option<Vec<(String, String)>>,
}

impl EnvironmentSource {
    /// Read from the process environment
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            vars: None,
        }
    }

    /// Read from a fixed set of variables
    pub fn with_vars<I, K, V>(prefix: impl Into<String>, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            prefix: prefix.into(),
            vars: Some(
                vars.into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    /// Map a variable name to a key, `None` if it lacks the prefix
    pub fn key_for(&self, var: &str) -> Option<String> {
        let rest = var.strip_prefix(self.prefix.as_str())?;
        if rest.is_empty() {
            return None;
        }
        Some(rest.to_lowercase().replace('_', "."))
    }

    fn collect<I>(&self, vars: I) -> RawBag
    where
        I: IntoIterator<Item = (String, String)>,
    {
        vars.into_iter()
            .filter_map(|(name, value)| self.key_for(&name).map(|key| (key, value)))
            .collect()
    }
}

impl SourceLoader for EnvironmentSource {
    fn kind(&self) -> ConfigSource {
        ConfigSource::Environment
    }

    fn name(&self) -> &str {
        "environment"
    }

    fn load(&self) -> Result<RawBag> {
        Ok(match &self.vars {
            Some(vars) => self.collect(vars.iter().cloned()),
            // vars_os skips entries that are not valid unicode instead of panicking
            None => self.collect(std::env::vars_os().filter_map(|(k, v)| {
                Some((k.into_string().ok()?, v.into_string().ok()?))
            })),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_mapping() {
        let source = EnvironmentSource::new("APP_");
        assert_eq!(source.key_for("APP_SERVER_PORT").as_deref(), Some("server.port"));
        assert_eq!(source.key_for("APP_DEBUG").as_deref(), Some("debug"));
        assert_eq!(source.key_for("APP_"), None);
        assert_eq!(source.key_for("PATH"), None);
    }

    #[test]
    fn test_load_from_snapshot() {
        let source = EnvironmentSource::with_vars(
            "APP_",
            [
                ("APP_SERVER_PORT", "9090"),
                ("HOME", "/root"),
                ("APP_LOG_LEVEL", "debug"),
            ],
        );
        let bag = source.load().unwrap();
        assert_eq!(bag.len(), 2);
        assert_eq!(bag["server.port"], "9090");
        assert_eq!(bag["log.level"], "debug");
    }
}
