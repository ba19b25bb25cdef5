//! Deterministic ignition order.
//!
//! Instances are sorted by explicit load order first, then by a topological
//! index over constructor dependency edges so that, among equal load orders, a
//! type comes after everything it depends on. The index is memoized per
//! identifier and only depends on registration data, which makes the order
//! stable across runs with the same registrations.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::trace;

use crate::instance::Instance;
use crate::metadata::{keys, MetadataStore, Property};

/// Load order used when a type declares none.
pub const DEFAULT_LOAD_ORDER: i64 = 1;

pub(crate) fn load_order_of(metadata: &MetadataStore, instance: &Instance) -> i64 {
    metadata
        .get(instance.type_key(), keys::LOAD_ORDER, &Property::Type)
        .and_then(|v| v.as_i64())
        .unwrap_or(DEFAULT_LOAD_ORDER)
}

/// Depth-first post-order numbering of identifiers over constructor edges.
///
/// An edge back into an identifier that is still being visited is skipped:
/// cycles that only exist in the ordering graph are resolved first-seen-wins
/// instead of failing.
pub(crate) struct TopologicalIndex<'a> {
    metadata: &'a MetadataStore,
    memo: HashMap<String, usize>,
    visiting: HashSet<String>,
    next: usize,
}

impl<'a> TopologicalIndex<'a> {
    pub(crate) fn new(metadata: &'a MetadataStore) -> Self {
        Self { metadata, memo: HashMap::new(), visiting: HashSet::new(), next: 0 }
    }

    pub(crate) fn index_of(&mut self, identifier: &str) -> usize {
        self.visit(identifier);
        self.memo.get(identifier).copied().unwrap_or(usize::MAX)
    }

    fn visit(&mut self, identifier: &str) {
        if self.memo.contains_key(identifier) {
            return;
        }
        if !self.visiting.insert(identifier.to_owned()) {
            trace!(identifier, "ordering cycle skipped");
            return;
        }
        if let Some(ty) = self.metadata.type_of(identifier) {
            let dependencies = self
                .metadata
                .get(ty, keys::PARAMETERS, &Property::Type)
                .map(|v| v.string_items())
                .unwrap_or_default();
            for dependency in &dependencies {
                self.visit(dependency);
            }
        }
        self.visiting.remove(identifier);
        self.memo.insert(identifier.to_owned(), self.next);
        self.next += 1;
    }
}

/// Sorts `instances` by ascending load order, then ascending topological
/// index. The input order (registration order) seeds the traversal.
pub(crate) fn sort_for_ignition(metadata: &MetadataStore, instances: Vec<Arc<Instance>>) -> Vec<Arc<Instance>> {
    let mut topology = TopologicalIndex::new(metadata);
    let mut keyed: Vec<(i64, usize, Arc<Instance>)> = instances
        .into_iter()
        .map(|instance| {
            let index = topology.index_of(instance.identifier());
            (load_order_of(metadata, &instance), index, instance)
        })
        .collect();
    keyed.sort_by_key(|(order, index, _)| (*order, *index));
    keyed.into_iter().map(|(_, _, instance)| instance).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MetaValue;
    use crate::key_of_type;

    struct A;
    struct B;
    struct C;

    fn store(edges: &[(&str, Vec<&str>)]) -> MetadataStore {
        let store = MetadataStore::new();
        let keys_by_id = [key_of_type::<A>(), key_of_type::<B>(), key_of_type::<C>()];
        for ((id, deps), ty) in edges.iter().zip(keys_by_id) {
            store.define(ty, keys::IDENTIFIER, (*id).into(), Property::Type).unwrap();
            let deps: Vec<MetaValue> = deps.iter().map(|d| (*d).into()).collect();
            store.define(ty, keys::PARAMETERS, MetaValue::List(deps), Property::Type).unwrap();
        }
        store
    }

    #[test]
    fn dependencies_get_lower_indices() {
        let store = store(&[("a", vec!["b"]), ("b", vec!["c"]), ("c", vec![])]);
        let mut topology = TopologicalIndex::new(&store);
        let a = topology.index_of("a");
        assert!(topology.index_of("c") < topology.index_of("b"));
        assert!(topology.index_of("b") < a);
    }

    #[test]
    fn ordering_cycles_are_soft() {
        let store = store(&[("a", vec!["b"]), ("b", vec!["a"]), ("c", vec![])]);
        let mut topology = TopologicalIndex::new(&store);
        // First seen wins: visiting "a" first places "b" before it.
        let a = topology.index_of("a");
        assert!(topology.index_of("b") < a);
        assert_ne!(topology.index_of("c"), usize::MAX);
    }

    #[test]
    fn unknown_identifiers_are_leaves() {
        let store = store(&[("a", vec!["$p:s:x", "nobody"])]);
        let mut topology = TopologicalIndex::new(&store);
        assert_eq!(topology.index_of("a"), 2);
    }
}
