//! Listener registry: live membership of instances in per-phase and
//! per-marker interest sets.
//!
//! Membership is maintained from construction and destruction events rather
//! than by rescanning instances, so ignition can keep its per-frame dispatch
//! sets current with amortized O(1) work per event.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use indexmap::{IndexMap, IndexSet};
use parking_lot::Mutex;
use tracing::trace;

use crate::instance::{Instance, InstanceId};

/// Callback invoked with the instance that joined or left a set.
pub type ListenerCallback = Arc<dyn Fn(&Arc<Instance>) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum EventKind {
    Added,
    Removed,
}

struct Subscriber {
    id: u64,
    callback: ListenerCallback,
}

struct ListenerRecord {
    instance: Arc<Instance>,
    // Back-references to every interest set the instance was inserted into.
    interests: IndexSet<String>,
}

#[derive(Default)]
struct RegistryInner {
    records: IndexMap<InstanceId, ListenerRecord>,
    interests: HashMap<String, IndexMap<InstanceId, Arc<Instance>>>,
    global: HashMap<EventKind, Vec<Subscriber>>,
    scoped: HashMap<(EventKind, String), Vec<Subscriber>>,
    next_subscriber: u64,
}

impl RegistryInner {
    fn callbacks(&self, kind: EventKind, interest: Option<&str>) -> Vec<ListenerCallback> {
        let subscribers = match interest {
            None => self.global.get(&kind),
            Some(id) => self.scoped.get(&(kind, id.to_owned())),
        };
        subscribers
            .map(|subs| subs.iter().map(|s| s.callback.clone()).collect())
            .unwrap_or_default()
    }

    fn subscribe(&mut self, kind: EventKind, interest: Option<String>, callback: ListenerCallback) -> u64 {
        self.next_subscriber += 1;
        let subscriber = Subscriber { id: self.next_subscriber, callback };
        match interest {
            None => self.global.entry(kind).or_default().push(subscriber),
            Some(id) => self.scoped.entry((kind, id)).or_default().push(subscriber),
        }
        self.next_subscriber
    }

    fn unsubscribe(&mut self, kind: EventKind, interest: Option<&str>, id: u64) {
        let subscribers = match interest {
            None => self.global.get_mut(&kind),
            Some(name) => self.scoped.get_mut(&(kind, name.to_owned())),
        };
        if let Some(subs) = subscribers {
            subs.retain(|s| s.id != id);
        }
    }
}

/// Handle to an event subscription. Subscriptions stay connected until
/// [`Subscription::disconnect`] is called.
pub struct Subscription {
    registry: Weak<Mutex<RegistryInner>>,
    kind: EventKind,
    interest: Option<String>,
    id: u64,
}

impl Subscription {
    pub fn disconnect(self) {
        if let Some(inner) = self.registry.upgrade() {
            inner.lock().unsubscribe(self.kind, self.interest.as_deref(), self.id);
        }
    }
}

/// Tracks which live instances implement which lifecycle phase or marker.
///
/// # Examples
///
/// ```rust
/// use ignite_di::{Container, ListenerRegistry};
/// use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
///
/// struct Probe;
///
/// let container = Container::new();
/// container.register::<Probe>("demo/Probe")
///     .implements(["Audited"])
///     .constructor(|_| Ok(Probe))
///     .finish()
///     .unwrap();
///
/// let seen = Arc::new(AtomicUsize::new(0));
/// let counter = seen.clone();
/// let _sub = container.listeners().on_added(
///     move |_| { counter.fetch_add(1, Ordering::SeqCst); },
///     Some("Audited"),
/// );
///
/// container.resolve_by_id("demo/Probe").unwrap();
/// assert_eq!(seen.load(Ordering::SeqCst), 1);
/// ```
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Announces `instance`. Inserts it into every interest set it is not yet
    /// part of, firing each set's added event, then fires the global added
    /// event exactly once.
    pub fn register(&self, instance: &Arc<Instance>) {
        let listener_ids = instance.listener_ids();
        let (scoped, global) = {
            let mut inner = self.inner.lock();
            let record = inner
                .records
                .entry(instance.id())
                .or_insert_with(|| ListenerRecord { instance: instance.clone(), interests: IndexSet::new() });

            let mut fresh = Vec::new();
            for id in listener_ids {
                if record.interests.insert(id.clone()) {
                    fresh.push(id);
                }
            }

            let mut scoped = Vec::with_capacity(fresh.len());
            for id in fresh {
                inner.interests.entry(id.clone()).or_default().insert(instance.id(), instance.clone());
                scoped.push(inner.callbacks(EventKind::Added, Some(&id)));
            }
            (scoped, inner.callbacks(EventKind::Added, None))
        };

        trace!(identifier = instance.identifier(), "listener added");
        for callback in scoped.iter().flatten() {
            callback(instance);
        }
        for callback in &global {
            callback(instance);
        }
    }

    /// Removes `instance` from every interest set it joined. Returns false if
    /// the instance was not registered.
    pub fn unregister(&self, instance: &Arc<Instance>) -> bool {
        let (scoped, global) = {
            let mut inner = self.inner.lock();
            let Some(record) = inner.records.shift_remove(&instance.id()) else {
                return false;
            };
            let mut scoped = Vec::with_capacity(record.interests.len());
            for id in &record.interests {
                if let Some(set) = inner.interests.get_mut(id) {
                    set.shift_remove(&instance.id());
                }
                scoped.push(inner.callbacks(EventKind::Removed, Some(id)));
            }
            (scoped, inner.callbacks(EventKind::Removed, None))
        };

        trace!(identifier = instance.identifier(), "listener removed");
        for callback in scoped.iter().flatten() {
            callback(instance);
        }
        for callback in &global {
            callback(instance);
        }
        true
    }

    /// Subscribes to additions, globally or for one interest set. Already
    /// registered members are replayed synchronously before this returns.
    pub fn on_added<F>(&self, callback: F, interest: Option<&str>) -> Subscription
    where
        F: Fn(&Arc<Instance>) + Send + Sync + 'static,
    {
        let callback: ListenerCallback = Arc::new(callback);
        let (id, existing) = {
            let mut inner = self.inner.lock();
            let id = inner.subscribe(EventKind::Added, interest.map(str::to_owned), callback.clone());
            let existing: Vec<Arc<Instance>> = match interest {
                None => inner.records.values().map(|r| r.instance.clone()).collect(),
                Some(name) => inner
                    .interests
                    .get(name)
                    .map(|set| set.values().cloned().collect())
                    .unwrap_or_default(),
            };
            (id, existing)
        };
        for instance in &existing {
            callback(instance);
        }
        self.subscription(EventKind::Added, interest, id)
    }

    /// Subscribes to removals, globally or for one interest set.
    pub fn on_removed<F>(&self, callback: F, interest: Option<&str>) -> Subscription
    where
        F: Fn(&Arc<Instance>) + Send + Sync + 'static,
    {
        let id = self
            .inner
            .lock()
            .subscribe(EventKind::Removed, interest.map(str::to_owned), Arc::new(callback));
        self.subscription(EventKind::Removed, interest, id)
    }

    fn subscription(&self, kind: EventKind, interest: Option<&str>, id: u64) -> Subscription {
        Subscription {
            registry: Arc::downgrade(&self.inner),
            kind,
            interest: interest.map(str::to_owned),
            id,
        }
    }

    pub fn is_registered(&self, instance: &Instance) -> bool {
        self.inner.lock().records.contains_key(&instance.id())
    }

    /// Current members of an interest set, in insertion order.
    pub fn members(&self, interest: &str) -> Vec<Arc<Instance>> {
        self.inner
            .lock()
            .interests
            .get(interest)
            .map(|set| set.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
