use crate::subscriber::Subscriber;
use fxhash::FxHashMap;
use parking_lot::RwLock;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Handle to one registration, returned by [`Dispatcher::subscribe`](crate::Dispatcher::subscribe).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    event_id: Arc<str>,
    seq: u64,
    priority: i32,
}

impl Subscription {
    /// Event ID the subscriber was registered under.
    #[must_use]
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    /// Registration sequence number, unique per dispatcher.
    #[must_use]
    pub const fn seq(&self) -> u64 {
        self.seq
    }

    /// Priority the subscriber was registered with.
    #[must_use]
    pub const fn priority(&self) -> i32 {
        self.priority
    }
}

#[derive(Clone)]
pub(crate) struct Entry {
    pub(crate) seq: u64,
    pub(crate) priority: i32,
    pub(crate) name: Cow<'static, str>,
    pub(crate) subscriber: Arc<dyn Subscriber>,
}

impl Entry {
    pub(crate) fn label(&self, position: usize) -> Cow<'static, str> {
        format!("{} (priority {}, position {position})", self.name, self.priority).into()
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("seq", &self.seq)
            .field("priority", &self.priority)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Immutable, priority-ordered view of one event ID's subscribers.
pub(crate) type Snapshot = Arc<Vec<Entry>>;

#[derive(Debug, Default)]
struct Routes {
    next_seq: u64,
    lists: FxHashMap<Arc<str>, Snapshot>,
}

/// Per-event-ID subscriber lists.
///
/// Lists are kept sorted by ascending priority; equal priorities keep registration order.
/// Readers clone the list's `Arc` under a short read lock, so an in-flight dispatch keeps
/// iterating its own snapshot while writers copy-on-write a new list.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    routes: RwLock<Routes>,
}

impl Registry {
    pub(crate) fn insert(
        &self,
        event_id: &str,
        subscriber: Arc<dyn Subscriber>,
        priority: i32,
    ) -> Subscription {
        if event_id.is_empty() {
            warn!(
                priority,
                "Subscriber registered under an empty event ID will never be dispatched"
            );
        }

        let name = subscriber.name();
        let mut routes = self.routes.write();

        let seq = routes.next_seq;
        routes.next_seq += 1;

        let key = routes
            .lists
            .get_key_value(event_id)
            .map_or_else(|| Arc::<str>::from(event_id), |(key, _)| key.clone());

        let list = Arc::make_mut(routes.lists.entry(key.clone()).or_default());
        let position = list.partition_point(|entry| entry.priority <= priority);
        list.insert(position, Entry { seq, priority, name, subscriber });
        let total = list.len();
        drop(routes);

        trace!(event = event_id, seq, priority, position, total, "Subscriber registered");
        Subscription { event_id: key, seq, priority }
    }

    pub(crate) fn remove(&self, subscription: &Subscription) -> bool {
        let mut routes = self.routes.write();
        let Some(snapshot) = routes.lists.get_mut(subscription.event_id()) else {
            return false;
        };
        let Some(index) = snapshot.iter().position(|entry| entry.seq == subscription.seq) else {
            return false;
        };

        Arc::make_mut(snapshot).remove(index);
        if snapshot.is_empty() {
            routes.lists.remove(subscription.event_id());
        }
        drop(routes);

        debug!(event = subscription.event_id(), seq = subscription.seq, "Subscriber removed");
        true
    }

    /// Current priority-ordered list for `event_id`, or `None` if nobody subscribed.
    pub(crate) fn snapshot(&self, event_id: &str) -> Option<Snapshot> {
        self.routes.read().lists.get(event_id).cloned()
    }

    pub(crate) fn len(&self, event_id: &str) -> usize {
        self.routes.read().lists.get(event_id).map_or(0, |list| list.len())
    }

    pub(crate) fn event_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> =
            self.routes.read().lists.keys().map(|key| key.as_ref().to_owned()).collect();
        ids.sort_unstable();
        ids
    }

    pub(crate) fn clear(&self) -> usize {
        let mut routes = self.routes.write();
        let count = routes.lists.len();
        routes.lists.clear();
        drop(routes);

        debug!(count, "Subscriber registry cleared");
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::event::{Event, PublishArgs};

    fn noop() -> Arc<dyn Subscriber> {
        Arc::new(|_: &dyn Event, _: &mut PublishArgs| -> Result<(), BoxError> { Ok(()) })
    }

    fn order(registry: &Registry, id: &str) -> Vec<(i32, u64)> {
        registry
            .snapshot(id)
            .map(|list| list.iter().map(|e| (e.priority, e.seq)).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_sorted_by_priority_then_registration() {
        let registry = Registry::default();
        registry.insert("x", noop(), 3);
        registry.insert("x", noop(), 1);
        registry.insert("x", noop(), 3);
        registry.insert("x", noop(), -5);
        registry.insert("x", noop(), 1);

        assert_eq!(order(&registry, "x"), vec![(-5, 3), (1, 1), (1, 4), (3, 0), (3, 2)]);
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_writes() {
        let registry = Registry::default();
        registry.insert("x", noop(), 0);

        let before = registry.snapshot("x").unwrap();
        registry.insert("x", noop(), 0);

        assert_eq!(before.len(), 1);
        assert_eq!(registry.len("x"), 2);
    }

    #[test]
    fn test_remove_and_cleanup() {
        let registry = Registry::default();
        let first = registry.insert("x", noop(), 0);
        let second = registry.insert("x", noop(), 0);

        assert!(registry.remove(&first));
        assert!(!registry.remove(&first), "second removal is a no-op");
        assert_eq!(registry.len("x"), 1);

        assert!(registry.remove(&second));
        assert!(registry.snapshot("x").is_none());
        assert!(registry.event_ids().is_empty());
    }

    #[test]
    fn test_event_ids_and_clear() {
        let registry = Registry::default();
        registry.insert("b", noop(), 0);
        registry.insert("a", noop(), 0);
        registry.insert("a", noop(), 1);

        assert_eq!(registry.event_ids(), vec!["a".to_owned(), "b".to_owned()]);
        assert_eq!(registry.clear(), 2);
        assert_eq!(registry.len("a"), 0);
    }

    #[test]
    fn test_concurrent_inserts_keep_every_entry() {
        let registry = Arc::new(Registry::default());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        registry.insert("x", noop(), (t * 50 + i) % 7);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let list = registry.snapshot("x").unwrap();
        assert_eq!(list.len(), 400);
        assert!(list.windows(2).all(|w| {
            w[0].priority < w[1].priority || (w[0].priority == w[1].priority && w[0].seq < w[1].seq)
        }));
    }
}
