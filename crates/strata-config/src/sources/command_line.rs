//! Command line configuration source
//!
//! Accepts `--key=value` and `-Dkey=value` tokens; anything else is ignored so
//! the full argument vector can be handed over unchanged.

use crate::Result;
use crate::events::ConfigSource;
use crate::merger::RawBag;
use crate::sources::SourceLoader;

#[derive(Debug, Clone, Default)]
pub struct CommandLineSource {
    args: Vec<String>,
}

impl CommandLineSource {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse one token into a key/value pair
    pub fn parse_arg(arg: &str) -> Option<(String, String)> {
        let body = arg
            .strip_prefix("--")
            .or_else(|| arg.strip_prefix("-D"))?;
        let (key, value) = body.split_once('=')?;
        let key = key.trim();
        if key.is_empty() {
            return None;
        }
        Some((key.to_string(), value.to_string()))
    }
}

impl SourceLoader for CommandLineSource {
    fn kind(&self) -> ConfigSource {
        ConfigSource::CommandLine
    }

    fn name(&self) -> &str {
        "command_line"
    }

    fn load(&self) -> Result<RawBag> {
        Ok(self
            .args
            .iter()
            .filter_map(|arg| Self::parse_arg(arg))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_arg() {
        assert_eq!(
            CommandLineSource::parse_arg("--server.port=8081"),
            Some(("server.port".to_string(), "8081".to_string()))
        );
        assert_eq!(
            CommandLineSource::parse_arg("-Dapp.env=test"),
            Some(("app.env".to_string(), "test".to_string()))
        );
        assert_eq!(
            CommandLineSource::parse_arg("--url=a=b"),
            Some(("url".to_string(), "a=b".to_string()))
        );
        assert_eq!(CommandLineSource::parse_arg("--verbose"), None);
        assert_eq!(CommandLineSource::parse_arg("--=x"), None);
        assert_eq!(CommandLineSource::parse_arg("plain"), None);
    }

    #[test]
    fn test_later_arguments_win() {
        let source = CommandLineSource::new(["prog", "--a=1", "--a=2", "-Db=3"]);
        let bag = source.load().unwrap();
        assert_eq!(bag["a"], "2");
        assert_eq!(bag["b"], "3");
    }
}
