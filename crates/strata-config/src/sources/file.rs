//! File-based configuration source
//!
//! Reads property files (`key=value` lines) and TOML files (nested tables
//! flattened to dotted keys). Files that do not exist are skipped.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::events::ConfigSource;
use crate::merger::RawBag;
use crate::sources::SourceLoader;
use crate::{ConfigError, Result};

/// Supported file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Properties,
    Toml,
}

impl FileFormat {
    /// Pick the format from the file extension, properties by default
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Self::Toml,
            _ => Self::Properties,
        }
    }

    pub fn parse(self, content: &str) -> Result<RawBag> {
        match self {
            Self::Properties => parse_properties(content),
            Self::Toml => parse_toml(content),
        }
    }
}

/// File source made of one or more files, later files overriding earlier ones
#[derive(Debug, Clone, Default)]
pub struct FileSource {
    paths: Vec<PathBuf>,
}

impl FileSource {
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }
}

impl SourceLoader for FileSource {
    fn kind(&self) -> ConfigSource {
        ConfigSource::File
    }

    fn name(&self) -> &str {
        "file"
    }

    fn load(&self) -> Result<RawBag> {
        let mut bag = RawBag::new();
        for path in &self.paths {
            if !path.exists() {
                debug!(path = %path.display(), "config file does not exist, skipping");
                continue;
            }
            match read_file(path) {
                Ok(entries) => {
                    debug!(path = %path.display(), keys = entries.len(), "loaded config file");
                    bag.extend(entries);
                }
                Err(e) => warn!(path = %path.display(), "failed to load config file: {e}"),
            }
        }
        Ok(bag)
    }
}

/// Read a whole file as key/value pairs
pub fn read_file(path: &Path) -> Result<RawBag> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::source(path.display().to_string(), e))?;
    FileFormat::from_path(path)
        .parse(&content)
        .map_err(|e| ConfigError::parse(format!("{}: {e}", path.display())))
}

/// Modification time of `path`, `None` if it cannot be read
pub fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Parse property-file content
///
/// Supports `key=value` and `key: value`, `#` and `!` comments and trailing
/// backslash continuations. Keys and values are trimmed, then backslash
/// escapes (`\n`, `\t`, `\=`, `\:`, `\\`, `\ `) are resolved. An escaped
/// space survives trimming.
pub fn parse_properties(content: &str) -> Result<RawBag> {
    let mut bag = RawBag::new();
    let mut lines = content.lines().enumerate();

    while let Some((index, line)) = lines.next() {
        let mut logical = line.trim_start().to_string();
        if logical.is_empty() || logical.starts_with('#') || logical.starts_with('!') {
            continue;
        }
        while ends_with_continuation(&logical) {
            logical.pop();
            match lines.next() {
                Some((_, next)) => logical.push_str(next.trim_start()),
                None => break,
            }
        }

        let Some(split) = find_separator(&logical) else {
            return Err(ConfigError::parse(format!(
                "line {}: expected key=value",
                index + 1
            )));
        };
        let key = unescape(&logical[..split]);
        if key.is_empty() {
            return Err(ConfigError::parse(format!("line {}: empty key", index + 1)));
        }
        bag.insert(key, unescape(&logical[split + 1..]));
    }

    Ok(bag)
}

/// Escape a key or value so [`parse_properties`] reads it back unchanged
pub fn escape_property(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let last = text.chars().count().saturating_sub(1);
    for (i, c) in text.chars().enumerate() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '=' | ':' | '#' | '!' => {
                out.push('\\');
                out.push(c);
            }
            ' ' if i == 0 || i == last => out.push_str("\\ "),
            _ => out.push(c),
        }
    }
    out
}

fn ends_with_continuation(line: &str) -> bool {
    line.chars().rev().take_while(|c| *c == '\\').count() % 2 == 1
}

/// Byte offset of the first unescaped `=` or `:`
fn find_separator(line: &str) -> Option<usize> {
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '=' | ':' => return Some(i),
            _ => {}
        }
    }
    None
}

/// Trim unescaped whitespace and resolve backslash escapes
fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut keep = 0;
    let mut chars = raw.trim_start().chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => {}
            }
            keep = out.len();
        } else {
            out.push(c);
            if !c.is_whitespace() {
                keep = out.len();
            }
        }
    }
    out.truncate(keep);
    out
}

/// Parse TOML content, flattening tables to dotted keys
pub fn parse_toml(content: &str) -> Result<RawBag> {
    let table: toml::Table = toml::from_str(content)
        .map_err(|e| ConfigError::parse(format!("TOML parse error: {e}")))?;
    let mut bag = RawBag::new();
    flatten_table("", &table, &mut bag);
    Ok(bag)
}

fn flatten_table(prefix: &str, table: &toml::Table, bag: &mut RawBag) {
    for (name, value) in table {
        let key = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}.{name}")
        };
        match value {
            toml::Value::Table(nested) => flatten_table(&key, nested, bag),
            toml::Value::Array(items) => {
                let joined: Vec<String> = items.iter().map(scalar_to_string).collect();
                bag.insert(key, joined.join(","));
            }
            other => {
                bag.insert(key, scalar_to_string(other));
            }
        }
    }
}

fn scalar_to_string(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
