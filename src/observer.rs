//! Observation hooks for resolution and lifecycle events.
//!
//! Observers are called synchronously. Keep implementations lightweight; the
//! container skips all timing work when none are registered.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, error};

use crate::lifecycle::Phase;
use crate::TypeKey;

/// Observer of container and ignition events.
///
/// # Examples
///
/// ```
/// use ignite_di::{Container, DiObserver, TypeKey};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// struct Counting;
///
/// impl DiObserver for Counting {
///     fn resolved(&self, _ty: TypeKey, identifier: &str, duration: Duration) {
///         println!("built {} in {:?}", identifier, duration);
///     }
/// }
///
/// let container = Container::new();
/// container.add_observer(Arc::new(Counting));
/// ```
pub trait DiObserver: Send + Sync {
    /// A singleton is about to be constructed.
    fn resolving(&self, _ty: TypeKey, _identifier: &str) {}

    /// A singleton was constructed and cached.
    fn resolved(&self, _ty: TypeKey, _identifier: &str, _duration: Duration) {}

    /// A lifecycle handler returned an error or panicked.
    fn lifecycle_failed(&self, _identifier: &str, _phase: Phase, _message: &str) {}
}

#[derive(Default)]
pub(crate) struct Observers {
    observers: RwLock<Vec<Arc<dyn DiObserver>>>,
}

impl Observers {
    pub(crate) fn add(&self, observer: Arc<dyn DiObserver>) {
        self.observers.write().push(observer);
    }

    #[inline]
    pub(crate) fn has_observers(&self) -> bool {
        !self.observers.read().is_empty()
    }

    fn snapshot(&self) -> Vec<Arc<dyn DiObserver>> {
        self.observers.read().clone()
    }

    pub(crate) fn resolving(&self, ty: TypeKey, identifier: &str) {
        for observer in self.snapshot() {
            observer.resolving(ty, identifier);
        }
    }

    pub(crate) fn resolved(&self, ty: TypeKey, identifier: &str, duration: Duration) {
        for observer in self.snapshot() {
            observer.resolved(ty, identifier, duration);
        }
    }

    pub(crate) fn lifecycle_failed(&self, identifier: &str, phase: Phase, message: &str) {
        for observer in self.snapshot() {
            observer.lifecycle_failed(identifier, phase, message);
        }
    }
}

/// Built-in observer forwarding events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl DiObserver for TracingObserver {
    fn resolving(&self, ty: TypeKey, identifier: &str) {
        debug!(identifier, type_name = ty.name(), "resolving");
    }

    fn resolved(&self, _ty: TypeKey, identifier: &str, duration: Duration) {
        debug!(identifier, ?duration, "resolved");
    }

    fn lifecycle_failed(&self, identifier: &str, phase: Phase, message: &str) {
        error!(identifier, %phase, message, "lifecycle handler failed");
    }
}
