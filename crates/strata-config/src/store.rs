//! Current-value store with per-key serialized writes
//!
//! Reads are plain map lookups. Every write to a key runs while holding that
//! key's history lock, so "read latest version, append, replace" is atomic
//! per key and version numbers never repeat under concurrent writers.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::Result;
use crate::history::VersionHistory;
use crate::item::{ConfigItem, ItemAttributes};
use crate::options::KeyPolicy;

/// Outcome of an accepted write
#[derive(Debug, Clone)]
pub struct Write {
    pub old: Option<Arc<ConfigItem>>,
    pub new: Arc<ConfigItem>,
}

/// Concurrent map from key to its current item, plus the version histories
#[derive(Debug)]
pub struct ConfigStore {
    items: DashMap<String, Arc<ConfigItem>>,
    histories: DashMap<String, Arc<Mutex<VersionHistory>>>,
    capacity: usize,
    policy: Arc<KeyPolicy>,
    /// Last versions carried over from a previous store
    floors: HashMap<String, u64>,
}

impl ConfigStore {
    /// Create an empty store
    pub fn new(capacity: usize, policy: Arc<KeyPolicy>) -> Self {
        Self::with_floors(capacity, policy, HashMap::new())
    }

    /// Create an empty store whose per-key versions continue after `floors`
    pub fn with_floors(
        capacity: usize,
        policy: Arc<KeyPolicy>,
        floors: HashMap<String, u64>,
    ) -> Self {
        Self {
            items: DashMap::new(),
            histories: DashMap::new(),
            capacity,
            policy,
            floors,
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<ConfigItem>> {
        self.items.get(key).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.items.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// All current items sorted by key
    pub fn snapshot(&self) -> Vec<Arc<ConfigItem>> {
        let mut items: Vec<Arc<ConfigItem>> =
            self.items.iter().map(|entry| entry.value().clone()).collect();
        items.sort_by(|a, b| a.key.cmp(&b.key));
        items
    }

    /// History of a key, oldest first
    pub fn history(&self, key: &str) -> Vec<Arc<ConfigItem>> {
        match self.histories.get(key).map(|entry| entry.value().clone()) {
            Some(history) => history.lock().entries(),
            None => Vec::new(),
        }
    }

    /// Highest version assigned to every key this store has seen
    pub fn last_versions(&self) -> HashMap<String, u64> {
        let mut versions = self.floors.clone();
        for entry in self.histories.iter() {
            versions.insert(entry.key().clone(), entry.value().lock().last_version());
        }
        versions
    }

    /// Attributes for the next version of `key`
    ///
    /// Attributes belong to the key: a new version inherits those of the
    /// current item, a new key starts from the policy.
    pub fn next_attributes(&self, key: &str, current: Option<&Arc<ConfigItem>>) -> ItemAttributes {
        match current {
            Some(item) => item.attributes(),
            None => self.policy.attributes_for(key),
        }
    }

    fn history_for(&self, key: &str) -> Arc<Mutex<VersionHistory>> {
        self.histories
            .entry(key.to_string())
            .or_insert_with(|| {
                let floor = self.floors.get(key).copied().unwrap_or(0);
                Arc::new(Mutex::new(VersionHistory::resume(key, self.capacity, floor)))
            })
            .value()
            .clone()
    }

    /// Run a write against `key` under its lock
    ///
    /// `op` sees the current item and the key's history. To accept the write it
    /// appends to the history and returns the appended item, which then
    /// becomes current. Returning `Ok(None)` discards the write.
    pub fn apply<F>(&self, key: &str, op: F) -> Result<Option<Write>>
    where
        F: FnOnce(Option<&Arc<ConfigItem>>, &mut VersionHistory) -> Result<Option<Arc<ConfigItem>>>,
    {
        let history = self.history_for(key);
        let mut history = history.lock();
        let current = self.get(key);

        let Some(new) = op(current.as_ref(), &mut history)? else {
            return Ok(None);
        };
        let old = self.items.insert(key.to_string(), new.clone());
        Ok(Some(Write { old, new }))
    }

    /// Like [`apply`](Self::apply) for writes that are either accepted or fail
    pub fn write<F>(&self, key: &str, op: F) -> Result<Write>
    where
        F: FnOnce(Option<&Arc<ConfigItem>>, &mut VersionHistory) -> Result<Arc<ConfigItem>>,
    {
        let history = self.history_for(key);
        let mut history = history.lock();
        let current = self.get(key);

        let new = op(current.as_ref(), &mut history)?;
        let old = self.items.insert(key.to_string(), new.clone());
        Ok(Write { old, new })
    }

    /// Remove the current item; the history is kept
    pub fn remove(&self, key: &str) -> Option<Arc<ConfigItem>> {
        self.remove_with(key, || {})
    }

    /// Remove the current item and run `cleanup` under the key lock if one was removed
    pub fn remove_with<F: FnOnce()>(&self, key: &str, cleanup: F) -> Option<Arc<ConfigItem>> {
        let history = self.histories.get(key).map(|entry| entry.value().clone());
        let _guard = history.as_ref().map(|h| h.lock());
        let removed = self.items.remove(key).map(|(_, item)| item);
        if removed.is_some() {
            cleanup();
        }
        removed
    }

    /// Replace the attributes of the current item without a new version
    pub fn set_attributes(
        &self,
        key: &str,
        attributes: ItemAttributes,
    ) -> Option<Arc<ConfigItem>> {
        let history = self.histories.get(key).map(|entry| entry.value().clone())?;
        let _guard = history.lock();
        let current = self.get(key)?;
        let updated = Arc::new(current.as_ref().clone().with_attributes(attributes));
        self.items.insert(key.to_string(), updated.clone());
        Some(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConfigError;
    use crate::events::ConfigSource;

    fn store() -> ConfigStore {
        ConfigStore::new(10, Arc::new(KeyPolicy::default()))
    }

    fn put(store: &ConfigStore, key: &str, value: &str) -> Write {
        store
            .apply(key, |current, history| {
                let attributes = store.next_attributes(key, current);
                Ok(Some(history.append(value, ConfigSource::Memory, attributes)))
            })
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_apply_replaces_current() {
        let store = store();
        let first = put(&store, "a", "1");
        assert!(first.old.is_none());
        let second = put(&store, "a", "2");
        assert_eq!(second.old.unwrap().value, "1");
        assert_eq!(store.get("a").unwrap().version, 2);
        assert_eq!(store.history("a").len(), 2);
    }

    #[test]
    fn test_discarded_write_changes_nothing() {
        let store = store();
        put(&store, "a", "1");
        let outcome = store.apply("a", |_, _| Ok(None)).unwrap();
        assert!(outcome.is_none());
        assert_eq!(store.history("a").len(), 1);
    }

    #[test]
    fn test_failed_write_changes_nothing() {
        let store = store();
        put(&store, "a", "1");
        let err = store
            .apply("a", |_, _| Err(ConfigError::ReadOnly { key: "a".into() }))
            .unwrap_err();
        assert!(matches!(err, ConfigError::ReadOnly { .. }));
        assert_eq!(store.get("a").unwrap().value, "1");
    }

    #[test]
    fn test_remove_keeps_history() {
        let store = store();
        put(&store, "a", "1");
        let removed = store.remove("a").unwrap();
        assert_eq!(removed.value, "1");
        assert!(store.get("a").is_none());
        assert_eq!(store.history("a").len(), 1);
        // next write continues numbering
        assert_eq!(put(&store, "a", "2").new.version, 2);
    }

    #[test]
    fn test_floors_continue_numbering() {
        let store = store();
        put(&store, "a", "1");
        put(&store, "a", "2");
        let next = ConfigStore::with_floors(10, Arc::new(KeyPolicy::default()), store.last_versions());
        assert_eq!(put(&next, "a", "3").new.version, 3);
        assert_eq!(put(&next, "b", "1").new.version, 1);
    }

    #[test]
    fn test_set_attributes_keeps_version() {
        let store = store();
        put(&store, "a", "1");
        let updated = store
            .set_attributes("a", ItemAttributes::new().read_only(true))
            .unwrap();
        assert!(updated.read_only);
        assert_eq!(updated.version, 1);
        assert!(!store.history("a")[0].read_only);
        assert!(store.set_attributes("missing", ItemAttributes::new()).is_none());
    }

    #[test]
    fn test_snapshot_sorted() {
        let store = store();
        put(&store, "b", "2");
        put(&store, "a", "1");
        let keys: Vec<String> = store.snapshot().iter().map(|i| i.key.clone()).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }
}
