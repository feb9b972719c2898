//! Source bags and priority-ordered merging
//!
//! Loading runs in two phases:
//! 1. Ingest - every source bag is written into the store unconditionally,
//!    silently, in load order.
//! 2. Reconcile - sources are walked in ascending rank order and a candidate
//!    replaces the current item only when no item exists or the candidate's
//!    source strictly outranks the current one. Accepted candidates produce
//!    events.
//!
//! Because reconcile visits the best source first and requires a strictly
//! better rank, the first source defining a key wins and a second reconcile
//! pass is a no-op for keys already held by their best source.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use tracing::debug;

use crate::Result;
use crate::events::{ConfigEvent, ConfigSource};
use crate::store::ConfigStore;

/// Raw key/value content of one source
pub type RawBag = BTreeMap<String, String>;

/// One raw bag per source kind
#[derive(Debug, Default)]
pub struct SourceRegistry {
    bags: [RwLock<RawBag>; 5],
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn bag(&self, source: ConfigSource) -> &RwLock<RawBag> {
        &self.bags[source.index()]
    }

    /// Snapshot of what `source` currently says
    pub fn values(&self, source: ConfigSource) -> RawBag {
        self.bag(source).read().clone()
    }

    pub fn put(&self, source: ConfigSource, key: impl Into<String>, value: impl Into<String>) {
        self.bag(source).write().insert(key.into(), value.into());
    }

    /// Merge `entries` into the bag of `source`
    pub fn extend(&self, source: ConfigSource, entries: &RawBag) {
        let mut bag = self.bag(source).write();
        for (key, value) in entries {
            bag.insert(key.clone(), value.clone());
        }
    }

    /// Drop `key` from every bag
    pub fn remove_everywhere(&self, key: &str) {
        for bag in &self.bags {
            bag.write().remove(key);
        }
    }

}

/// Write a bag into the store unconditionally and without events
///
/// Returns the number of keys written.
pub fn ingest(store: &ConfigStore, source: ConfigSource, bag: &RawBag) -> Result<usize> {
    for (key, value) in bag {
        store.apply(key, |current, history| {
            let attributes = store.next_attributes(key, current);
            Ok(Some(history.append(value.as_str(), source, attributes)))
        })?;
    }
    debug!(%source, keys = bag.len(), "ingested source");
    Ok(bag.len())
}

/// Priority-checked merge of every source bag into the store
///
/// Returns the events for accepted candidates in acceptance order. The caller
/// decides when to deliver them.
pub fn reconcile(store: &ConfigStore, registry: &SourceRegistry) -> Result<Vec<ConfigEvent>> {
    let mut events = Vec::new();
    for &source in ConfigSource::by_priority() {
        for (key, value) in registry.values(source) {
            let outcome = store.apply(&key, |current, history| {
                if current.is_some_and(|item| !source.outranks(item.source)) {
                    return Ok(None);
                }
                let attributes = store.next_attributes(&key, current);
                Ok(Some(history.append(value.as_str(), source, attributes)))
            })?;
            if let Some(write) = outcome {
                events.push(ConfigEvent::for_write(write.old, write.new));
            }
        }
    }
    debug!(accepted = events.len(), total = store.len(), "reconciled sources");
    Ok(events)
}
