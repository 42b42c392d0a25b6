//! Observer registration tables.
//!
//! `ListenerSet` is the event-name → observers table. Every live handle owns
//! one, and the process-wide `SubscriptionRegistry` wraps another that
//! outlives handles so it can be replayed onto each new one.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::events::{EventName, InboundEvent, InboundMessage};

static NEXT_OBSERVER_ID: AtomicU64 = AtomicU64::new(1);

type Callback = dyn Fn(&InboundEvent) + Send + Sync;

/// A registered callback.
///
/// Identity is fixed at construction: clones of one `Observer` compare equal
/// and count once per event name, two observers built from the same closure
/// do not.
#[derive(Clone)]
pub struct Observer {
    id: u64,
    callback: Arc<Callback>,
}

impl Observer {
    /// Wrap a callback.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&InboundEvent) + Send + Sync + 'static,
    {
        Self {
            id: NEXT_OBSERVER_ID.fetch_add(1, Ordering::Relaxed),
            callback: Arc::new(callback),
        }
    }

    /// Observer that only sees chat messages.
    pub fn messages<F>(callback: F) -> Self
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        Self::new(move |event| {
            if let InboundEvent::NewMessage(message) = event {
                callback(message);
            }
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    fn call(&self, event: &InboundEvent) {
        (self.callback)(event)
    }
}

impl PartialEq for Observer {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Observer {}

impl std::fmt::Debug for Observer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observer").field("id", &self.id).finish()
    }
}

/// Event name → observers, each observer at most once per name.
#[derive(Default)]
pub struct ListenerSet {
    table: Mutex<BTreeMap<EventName, Vec<Observer>>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, BTreeMap<EventName, Vec<Observer>>> {
        // Observers run outside the lock, so a poisoned table still holds a
        // consistent map.
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add an observer. Returns false if it was already registered for `name`.
    pub fn insert(&self, name: EventName, observer: Observer) -> bool {
        let mut table = self.table();
        let observers = table.entry(name).or_default();
        if observers.contains(&observer) {
            return false;
        }
        observers.push(observer);
        true
    }

    /// Remove one observer. Returns false if it was not registered.
    pub fn remove(&self, name: &EventName, observer: &Observer) -> bool {
        let mut table = self.table();
        let Some(observers) = table.get_mut(name) else {
            return false;
        };
        let before = observers.len();
        observers.retain(|o| o != observer);
        let removed = observers.len() != before;
        if observers.is_empty() {
            table.remove(name);
        }
        removed
    }

    /// Remove every observer for `name`. Returns how many were removed.
    pub fn remove_all(&self, name: &EventName) -> usize {
        self.table().remove(name).map(|v| v.len()).unwrap_or(0)
    }

    /// Call every observer registered under the event's name.
    ///
    /// Returns the number of observers called.
    pub fn dispatch(&self, event: &InboundEvent) -> usize {
        let name = event.name();
        let observers = match self.table().get(&name) {
            Some(observers) => observers.clone(),
            None => {
                debug!("no observers for {name}");
                return 0;
            }
        };
        for observer in &observers {
            observer.call(event);
        }
        observers.len()
    }

    /// Snapshot of every (name, observer) pair, in name order then insertion order.
    pub fn entries(&self) -> Vec<(EventName, Observer)> {
        self.table()
            .iter()
            .flat_map(|(name, observers)| observers.iter().map(|o| (name.clone(), o.clone())))
            .collect()
    }

    /// Number of observers for `name`.
    pub fn count(&self, name: &EventName) -> usize {
        self.table().get(name).map(Vec::len).unwrap_or(0)
    }

    /// Total number of registrations.
    pub fn len(&self) -> usize {
        self.table().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-wide subscription table.
///
/// Lives as long as the application, independent of any connection: it is
/// not cleared on disconnect and is replayed onto every new handle.
#[derive(Clone, Default)]
pub struct SubscriptionRegistry {
    listeners: Arc<ListenerSet>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: EventName, observer: Observer) -> bool {
        self.listeners.insert(name, observer)
    }

    pub fn remove(&self, name: &EventName, observer: &Observer) -> bool {
        self.listeners.remove(name, observer)
    }

    pub fn remove_all(&self, name: &EventName) -> usize {
        self.listeners.remove_all(name)
    }

    /// Deliver a locally raised event (diagnostics) straight to observers.
    pub fn dispatch(&self, event: &InboundEvent) -> usize {
        self.listeners.dispatch(event)
    }

    /// Copy every registration onto a handle's listener table.
    pub fn replay_onto(&self, target: &ListenerSet) -> usize {
        let entries = self.listeners.entries();
        let count = entries.len();
        for (name, observer) in entries {
            target.insert(name, observer);
        }
        count
    }

    pub fn count(&self, name: &EventName) -> usize {
        self.listeners.count(name)
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting() -> (Observer, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let observer = Observer::new(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        (observer, hits)
    }

    fn custom(name: &str) -> InboundEvent {
        InboundEvent::Custom {
            name: name.into(),
            data: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_duplicate_insert_is_ignored() {
        let set = ListenerSet::new();
        let (observer, hits) = counting();
        let name = EventName::Custom("a".into());

        assert!(set.insert(name.clone(), observer.clone()));
        assert!(!set.insert(name.clone(), observer.clone()));
        assert_eq!(set.count(&name), 1);

        assert_eq!(set.dispatch(&custom("a")), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_same_observer_under_two_names() {
        let set = ListenerSet::new();
        let (observer, hits) = counting();
        set.insert(EventName::Custom("a".into()), observer.clone());
        set.insert(EventName::Custom("b".into()), observer);

        set.dispatch(&custom("a"));
        set.dispatch(&custom("b"));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let set = ListenerSet::new();
        let (observer, _) = counting();
        assert!(!set.remove(&EventName::NewMessage, &observer));
        assert_eq!(set.remove_all(&EventName::NewMessage), 0);
    }

    #[test]
    fn test_remove_one_keeps_others() {
        let set = ListenerSet::new();
        let (first, first_hits) = counting();
        let (second, second_hits) = counting();
        let name = EventName::Custom("a".into());
        set.insert(name.clone(), first.clone());
        set.insert(name.clone(), second);

        assert!(set.remove(&name, &first));
        set.dispatch(&custom("a"));
        assert_eq!(first_hits.load(Ordering::SeqCst), 0);
        assert_eq!(second_hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_observer_may_reenter_the_set() {
        let set = Arc::new(ListenerSet::new());
        let inner = set.clone();
        let observer = Observer::new(move |_| {
            inner.remove_all(&EventName::Custom("a".into()));
        });
        set.insert(EventName::Custom("a".into()), observer);
        assert_eq!(set.dispatch(&custom("a")), 1);
        assert!(set.is_empty());
    }

    #[test]
    fn test_message_observer_filters() {
        let set = ListenerSet::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let observer = Observer::messages(move |m| {
            assert_eq!(m.chat_room_id, "r1");
            h.fetch_add(1, Ordering::SeqCst);
        });
        set.insert(EventName::NewMessage, observer);

        let message = serde_json::json!({
            "chatRoomId": "r1",
            "senderId": "u1",
            "senderRole": "admin",
            "message": "hi",
            "createdAt": "2024-05-01T10:00:00Z"
        });
        set.dispatch(&InboundEvent::from_wire("new-message", message).unwrap());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_registry_replay() {
        let registry = SubscriptionRegistry::new();
        let (a, a_hits) = counting();
        let (b, b_hits) = counting();
        registry.insert(EventName::Custom("a".into()), a);
        registry.insert(EventName::Custom("b".into()), b);

        let handle_table = ListenerSet::new();
        assert_eq!(registry.replay_onto(&handle_table), 2);
        // Replaying twice does not duplicate
        registry.replay_onto(&handle_table);
        assert_eq!(handle_table.len(), 2);

        handle_table.dispatch(&custom("a"));
        handle_table.dispatch(&custom("b"));
        assert_eq!(a_hits.load(Ordering::SeqCst), 1);
        assert_eq!(b_hits.load(Ordering::SeqCst), 1);
    }
}
