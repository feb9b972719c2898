//! Bounded per-key version history
//!
//! Entries are kept oldest to newest. Appending beyond capacity evicts the
//! oldest entry. Entries are shared `Arc`s and never change after insertion.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::events::ConfigSource;
use crate::item::{ConfigItem, ItemAttributes};

/// Default number of versions kept per key
pub const DEFAULT_HISTORY_CAPACITY: usize = 10;

/// Version history of a single key
#[derive(Debug, Clone)]
pub struct VersionHistory {
    key: String,
    entries: VecDeque<Arc<ConfigItem>>,
    capacity: usize,
    /// Highest version ever assigned, survives eviction and reloads
    last_version: u64,
}

impl VersionHistory {
    /// Create an empty history
    pub fn new(key: impl Into<String>, capacity: usize) -> Self {
        Self::resume(key, capacity, 0)
    }

    /// Create an empty history whose next version follows `last_version`
    pub fn resume(key: impl Into<String>, capacity: usize, last_version: u64) -> Self {
        let capacity = capacity.max(1);
        Self {
            key: key.into(),
            entries: VecDeque::with_capacity(capacity),
            capacity,
            last_version,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Highest version assigned so far (0 if none)
    pub fn last_version(&self) -> u64 {
        self.last_version
    }

    /// Version number the next appended item must carry
    pub fn next_version(&self) -> u64 {
        self.last_version + 1
    }

    /// Append a version, evicting the oldest one when over capacity
    pub fn add_version(&mut self, item: Arc<ConfigItem>) {
        debug_assert!(item.version > self.last_version);
        self.last_version = self.last_version.max(item.version);
        self.entries.push_back(item);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Stamp a new item with the next version and append it
    pub fn append(
        &mut self,
        value: impl Into<String>,
        source: ConfigSource,
        attributes: ItemAttributes,
    ) -> Arc<ConfigItem> {
        let item = Arc::new(
            ConfigItem::new(self.key.clone(), value, source, self.next_version())
                .with_attributes(attributes),
        );
        self.add_version(item.clone());
        item
    }

    /// Newest entry
    pub fn latest(&self) -> Option<&Arc<ConfigItem>> {
        self.entries.back()
    }

    /// Find a version, scanning from newest to oldest
    pub fn find(&self, version: u64) -> Option<&Arc<ConfigItem>> {
        self.entries.iter().rev().find(|item| item.version == version)
    }

    /// Snapshot of all entries, oldest first
    pub fn entries(&self) -> Vec<Arc<ConfigItem>> {
        self.entries.iter().cloned().collect()
    }

    /// Append a new version carrying the value of `version`
    ///
    /// The target entry is left untouched; the new entry is tagged
    /// [`ConfigSource::Memory`] and numbered after the latest version.
    /// Returns `None` when `version` is not in the history.
    pub fn rollback(
        &mut self,
        version: u64,
        attributes: ItemAttributes,
    ) -> Option<Arc<ConfigItem>> {
        let value = self.find(version)?.value.clone();
        Some(self.append(value, ConfigSource::Memory, attributes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push(history: &mut VersionHistory, value: &str) -> Arc<ConfigItem> {
        history.append(value, ConfigSource::Memory, ItemAttributes::default())
    }

    #[test]
    fn test_versions_start_at_one() {
        let mut history = VersionHistory::new("k", 10);
        assert!(history.latest().is_none());
        push(&mut history, "a");
        push(&mut history, "b");
        let versions: Vec<u64> = history.entries().iter().map(|i| i.version).collect();
        assert_eq!(versions, vec![1, 2]);
    }

    #[test]
    fn test_eviction_keeps_most_recent() {
        let mut history = VersionHistory::new("k", 3);
        for value in ["a", "b", "c", "d", "e"] {
            push(&mut history, value);
        }
        let values: Vec<String> = history.entries().iter().map(|i| i.value.clone()).collect();
        assert_eq!(values, vec!["c", "d", "e"]);
        assert_eq!(history.len(), 3);
        assert_eq!(history.next_version(), 6);
    }

    #[test]
    fn test_rollback_appends_forward_version() {
        let mut history = VersionHistory::new("db.timeout", 10);
        let first = push(&mut history, "30");
        push(&mut history, "60");

        let restored = history.rollback(1, ItemAttributes::default()).unwrap();
        assert_eq!(restored.value, "30");
        assert_eq!(restored.version, 3);
        assert_eq!(restored.source, ConfigSource::Memory);
        // target entry untouched
        assert_eq!(history.find(1), Some(&first));
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn test_rollback_to_evicted_version_fails() {
        let mut history = VersionHistory::new("k", 2);
        for value in ["a", "b", "c"] {
            push(&mut history, value);
        }
        assert!(history.rollback(1, ItemAttributes::default()).is_none());
        assert_eq!(history.len(), 2);
        assert_eq!(history.next_version(), 4);
    }

    #[test]
    fn test_resume_continues_numbering() {
        let mut history = VersionHistory::resume("k", 10, 7);
        assert!(history.is_empty());
        let item = push(&mut history, "x");
        assert_eq!(item.version, 8);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let history = VersionHistory::new("k", 0);
        assert_eq!(history.capacity(), 1);
    }
}
