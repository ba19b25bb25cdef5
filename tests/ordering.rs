/// Property-based tests for ignition ordering
///
/// Roots are sorted by explicit load order, with dependency edges breaking
/// ties so that a type is always ignited after what it is built from.
use ignite_di::{Container, IgniteConfig, Ignition};
use proptest::prelude::*;

macro_rules! unit_types {
    ($($name:ident),*) => {
        $(struct $name;)*

        /// Registers the types in declaration order as server singletons.
        fn register_all(container: &Container, orders: &[i64], deps: &[Option<usize>]) {
            let mut index = 0;
            $(
                let mut builder = container
                    .register::<$name>(format!("t/{}", index))
                    .service()
                    .load_order(orders[index])
                    .constructor(|_| Ok($name));
                if let Some(dep) = deps[index] {
                    builder = builder.depends_on([format!("t/{}", dep)]);
                }
                builder.finish().unwrap();
                index += 1;
            )*
            let _ = index;
        }
    };
}

unit_types!(T0, T1, T2, T3, T4, T5);

fn ignite(orders: &[i64], deps: &[Option<usize>]) -> Vec<String> {
    let container = Container::new();
    register_all(&container, orders, deps);
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
    let ignition = Ignition::new(container, IgniteConfig::default());
    runtime.block_on(ignition.ignite()).unwrap();
    ignition.load_order()
}

fn position(order: &[String], index: usize) -> usize {
    let id = format!("t/{}", index);
    order.iter().position(|o| *o == id).unwrap()
}

proptest! {
    /// Without dependencies the order is a stable sort by load order.
    #[test]
    fn independent_types_sort_stably(orders in prop::collection::vec(-2i64..3, 6)) {
        let order = ignite(&orders, &[None; 6]);

        let mut expected: Vec<usize> = (0..6).collect();
        expected.sort_by_key(|i| orders[*i]);
        let expected: Vec<String> = expected.into_iter().map(|i| format!("t/{}", i)).collect();
        prop_assert_eq!(order, expected);
    }

    /// Among equal load orders a dependency always comes first, and repeated
    /// runs agree.
    #[test]
    fn dependencies_come_first_on_ties(
        orders in prop::collection::vec(0i64..2, 6),
        links in prop::collection::vec(prop::option::of(0usize..6), 6),
    ) {
        // Only point at earlier-registered types so the graph stays acyclic.
        let deps: Vec<Option<usize>> = links
            .iter()
            .enumerate()
            .map(|(i, link)| link.filter(|d| *d < i))
            .collect();

        let order = ignite(&orders, &deps);
        prop_assert_eq!(order.len(), 6);
        for (i, dep) in deps.iter().enumerate() {
            if let Some(d) = dep {
                if orders[i] == orders[*d] {
                    prop_assert!(position(&order, *d) < position(&order, i));
                }
            }
        }
        prop_assert_eq!(ignite(&orders, &deps), order);
    }
}
