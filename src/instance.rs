//! Live instances produced by the container.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::lifecycle::{OnInit, OnPhysics, OnRender, OnStart, OnTick, Phase};
use crate::TypeKey;

/// Type-erased shared value.
pub type AnyArc = Arc<dyn Any + Send + Sync>;

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a constructed instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(u64);

impl InstanceId {
    fn next() -> Self {
        InstanceId(NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Lifecycle handlers an instance exposes, resolved once at construction.
#[derive(Clone, Default)]
pub struct Capabilities {
    pub(crate) init: Option<Arc<dyn OnInit>>,
    pub(crate) start: Option<Arc<dyn OnStart>>,
    pub(crate) tick: Option<Arc<dyn OnTick>>,
    pub(crate) physics: Option<Arc<dyn OnPhysics>>,
    pub(crate) render: Option<Arc<dyn OnRender>>,
}

impl Capabilities {
    pub fn has(&self, phase: Phase) -> bool {
        match phase {
            Phase::Init => self.init.is_some(),
            Phase::Start => self.start.is_some(),
            Phase::Tick => self.tick.is_some(),
            Phase::Physics => self.physics.is_some(),
            Phase::Render => self.render.is_some(),
        }
    }

    pub fn phases(&self) -> Vec<Phase> {
        Phase::ALL.into_iter().filter(|p| self.has(*p)).collect()
    }
}

/// A value built by the container together with its cached capability tags.
///
/// Instances are what the listener registry tracks and what ignition
/// dispatches lifecycle calls to. The wrapped value is reachable through
/// [`Instance::downcast`].
pub struct Instance {
    id: InstanceId,
    ty: TypeKey,
    identifier: String,
    value: AnyArc,
    capabilities: Capabilities,
    markers: Vec<String>,
}

impl Instance {
    pub(crate) fn new(
        ty: TypeKey,
        identifier: String,
        value: AnyArc,
        capabilities: Capabilities,
        markers: Vec<String>,
    ) -> Self {
        Self { id: InstanceId::next(), ty, identifier, value, capabilities, markers }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn type_key(&self) -> TypeKey {
        self.ty
    }

    /// Identifier of the instance's type, or its short type name.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn value(&self) -> &AnyArc {
        &self.value
    }

    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.value.clone().downcast::<T>().ok()
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn implements(&self, phase: Phase) -> bool {
        self.capabilities.has(phase)
    }

    /// Marker interface identifiers declared for the type and its ancestors.
    pub fn markers(&self) -> &[String] {
        &self.markers
    }

    /// Every listener identifier this instance satisfies: implemented phases
    /// first, then markers.
    pub fn listener_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .capabilities
            .phases()
            .into_iter()
            .map(|p| p.listener_id().to_owned())
            .collect();
        for marker in &self.markers {
            if !ids.contains(marker) {
                ids.push(marker.clone());
            }
        }
        ids
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.id)
            .field("identifier", &self.identifier)
            .field("phases", &self.capabilities.phases())
            .field("markers", &self.markers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_of_type;

    #[test]
    fn ids_are_unique_and_markers_deduplicated() {
        let a = Instance::new(
            key_of_type::<u8>(),
            "a".into(),
            Arc::new(1u8),
            Capabilities::default(),
            vec!["Marker".into(), "Marker".into()],
        );
        let b = Instance::new(key_of_type::<u8>(), "b".into(), Arc::new(2u8), Capabilities::default(), vec![]);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.listener_ids(), vec!["Marker".to_string()]);
        assert_eq!(*a.downcast::<u8>().unwrap(), 1);
        assert!(a.downcast::<u16>().is_none());
    }
}
