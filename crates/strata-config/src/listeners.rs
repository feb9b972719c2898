//! Synchronous change notification
//!
//! Listeners run on the thread that performed the mutation, in registration
//! order, after the mutation has committed. Each notification pass works on a
//! snapshot of the listener list, so registering or removing listeners while a
//! pass is running never affects that pass.
//!
//! A listener that returns an error or panics is logged and skipped; the
//! remaining listeners still run and the mutation stays committed.
//!
//! Listeners must be fast. A listener may write other keys; nested writes are
//! bounded by [`MAX_NOTIFY_DEPTH`].

use std::cell::Cell;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwap;
use tracing::error;

use crate::events::ConfigEvent;

/// Deepest chain of listener-triggered writes allowed on one thread
pub const MAX_NOTIFY_DEPTH: usize = 8;

thread_local! {
    static NOTIFY_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Number of notification passes currently running on this thread
pub(crate) fn notify_depth() -> usize {
    NOTIFY_DEPTH.with(Cell::get)
}

struct DepthGuard;

impl DepthGuard {
    fn enter() -> Self {
        NOTIFY_DEPTH.with(|depth| depth.set(depth.get() + 1));
        Self
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        NOTIFY_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Receiver of configuration change events
pub trait ConfigListener: Send + Sync {
    fn on_event(&self, event: &ConfigEvent) -> anyhow::Result<()>;
}

impl<F> ConfigListener for F
where
    F: Fn(&ConfigEvent) -> anyhow::Result<()> + Send + Sync,
{
    fn on_event(&self, event: &ConfigEvent) -> anyhow::Result<()> {
        self(event)
    }
}

/// Handle returned on registration, used to unregister
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Registration = (ListenerId, Arc<dyn ConfigListener>);

/// Ordered, copy-on-write list of listeners
pub struct ListenerBus {
    listeners: ArcSwap<Vec<Registration>>,
    next_id: AtomicU64,
}

impl ListenerBus {
    pub fn new() -> Self {
        Self {
            listeners: ArcSwap::from_pointee(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Append a listener to the end of the notification order
    pub fn add(&self, listener: Arc<dyn ConfigListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push((id, listener.clone()));
            next
        });
        id
    }

    /// Unregister a listener, returns false if it was not registered
    pub fn remove(&self, id: ListenerId) -> bool {
        let previous = self.listeners.rcu(|current| {
            current
                .iter()
                .filter(|(lid, _)| *lid != id)
                .cloned()
                .collect::<Vec<_>>()
        });
        previous.iter().any(|(lid, _)| *lid == id)
    }

    pub fn len(&self) -> usize {
        self.listeners.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver one event to every listener registered at the start of the pass
    pub fn notify(&self, event: &ConfigEvent) {
        let snapshot = self.listeners.load_full();
        if snapshot.is_empty() {
            return;
        }
        let _depth = DepthGuard::enter();
        for (id, listener) in snapshot.iter() {
            match catch_unwind(AssertUnwindSafe(|| listener.on_event(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(
                    listener = id.0,
                    key = event.key(),
                    kind = event.kind(),
                    "config listener failed: {e:#}"
                ),
                Err(_) => error!(
                    listener = id.0,
                    key = event.key(),
                    kind = event.kind(),
                    "config listener panicked"
                ),
            }
        }
    }

    /// Deliver events in order
    pub fn notify_all<'a>(&self, events: impl IntoIterator<Item = &'a ConfigEvent>) {
        for event in events {
            self.notify(event);
        }
    }
}

impl Default for ListenerBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ListenerBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerBus")
            .field("listeners", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ConfigSource;
    use crate::item::ConfigItem;
    use parking_lot::Mutex;

    fn added(key: &str) -> ConfigEvent {
        ConfigEvent::Added {
            key: key.to_string(),
            item: Arc::new(ConfigItem::new(key, "v", ConfigSource::Memory, 1)),
        }
    }

    fn recorder() -> (Arc<Mutex<Vec<String>>>, Arc<dyn ConfigListener>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let listener: Arc<dyn ConfigListener> =
            Arc::new(move |event: &ConfigEvent| -> anyhow::Result<()> {
                sink.lock().push(event.key().to_string());
                Ok(())
            });
        (seen, listener)
    }

    #[test]
    fn test_failing_listeners_are_isolated() {
        let bus = ListenerBus::new();
        bus.add(Arc::new(|_: &ConfigEvent| -> anyhow::Result<()> {
            anyhow::bail!("always fails")
        }));
        bus.add(Arc::new(|_: &ConfigEvent| -> anyhow::Result<()> {
            panic!("listener panic")
        }));
        let (seen, listener) = recorder();
        bus.add(listener);

        bus.notify(&added("a"));
        bus.notify(&added("b"));
        assert_eq!(*seen.lock(), vec!["a", "b"]);
    }

    #[test]
    fn test_registration_order() {
        let bus = ListenerBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for n in 0..3 {
            let order = order.clone();
            bus.add(Arc::new(move |_: &ConfigEvent| -> anyhow::Result<()> {
                order.lock().push(n);
                Ok(())
            }));
        }
        bus.notify(&added("a"));
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_remove() {
        let bus = ListenerBus::new();
        let (seen, listener) = recorder();
        let id = bus.add(listener);
        assert!(bus.remove(id));
        assert!(!bus.remove(id));
        bus.notify(&added("a"));
        assert!(seen.lock().is_empty());
        assert!(bus.is_empty());
    }

    #[test]
    fn test_listener_added_during_pass_waits_for_next_event() {
        let bus = Arc::new(ListenerBus::new());
        let (seen, late) = recorder();
        let bus_in_listener = bus.clone();
        let registered = Arc::new(Mutex::new(false));
        let flag = registered.clone();
        bus.add(Arc::new(move |_: &ConfigEvent| -> anyhow::Result<()> {
            let mut done = flag.lock();
            if !*done {
                bus_in_listener.add(late.clone());
                *done = true;
            }
            Ok(())
        }));

        bus.notify(&added("first"));
        assert!(seen.lock().is_empty());
        bus.notify(&added("second"));
        assert_eq!(*seen.lock(), vec!["second"]);
    }

    #[test]
    fn test_depth_is_tracked_during_notification() {
        let bus = ListenerBus::new();
        let observed = Arc::new(Mutex::new(0));
        let sink = observed.clone();
        bus.add(Arc::new(move |_: &ConfigEvent| -> anyhow::Result<()> {
            *sink.lock() = notify_depth();
            Ok(())
        }));
        assert_eq!(notify_depth(), 0);
        bus.notify(&added("a"));
        assert_eq!(*observed.lock(), 1);
        assert_eq!(notify_depth(), 0);
    }
}
