use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ignite_di::*;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// ===== Resolution =====

fn bench_singleton_hit(c: &mut Criterion) {
    let container = Container::new();
    container.register::<u64>("bench/Answer").constructor(|_| Ok(42u64)).finish().unwrap();

    // Prime the singleton
    let _ = container.resolve::<u64>().unwrap();

    c.bench_function("singleton_hit_u64", |b| {
        b.iter(|| {
            let v = container.resolve::<u64>().unwrap();
            black_box(v);
        })
    });
}

fn bench_singleton_cold(c: &mut Criterion) {
    struct Leaf;
    struct Middle(Arc<Leaf>);
    struct Root(Arc<Middle>, Arc<String>);

    c.bench_function("singleton_cold_chain", |b| {
        b.iter_batched(
            || {
                let container = Container::new();
                container.register::<Leaf>("bench/Leaf").constructor(|_| Ok(Leaf)).finish().unwrap();
                container
                    .register::<Middle>("bench/Middle")
                    .depends_on(["bench/Leaf"])
                    .constructor(|args| Ok(Middle(args.get(0)?)))
                    .finish()
                    .unwrap();
                container
                    .register::<Root>("bench/Root")
                    .depends_on(["bench/Middle", "$p:s:label"])
                    .constructor(|args| Ok(Root(args.get(0)?, args.get(1)?)))
                    .finish()
                    .unwrap();
                container
            },
            |container| {
                let root = container.resolve::<Root>().unwrap();
                black_box(root);
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

// ===== Frame dispatch =====

struct Counter {
    ticks: AtomicU64,
}

#[async_trait]
impl OnTick for Counter {
    async fn on_tick(&self, _dt: f64) -> LifecycleResult {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

macro_rules! tickers {
    ($($name:ident),*) => {
        $(
            struct $name(Counter);

            #[async_trait]
            impl OnTick for $name {
                async fn on_tick(&self, dt: f64) -> LifecycleResult {
                    self.0.on_tick(dt).await
                }
            }
        )*

        fn register_tickers(container: &Container, count: usize) {
            let mut registered = 0;
            $(
                if registered < count {
                    container
                        .register::<$name>(concat!("bench/", stringify!($name)))
                        .service()
                        .constructor(|_| Ok($name(Counter { ticks: AtomicU64::new(0) })))
                        .on_tick()
                        .finish()
                        .unwrap();
                    registered += 1;
                }
            )*
            let _ = registered;
        }
    };
}

tickers!(A0, A1, A2, A3, A4, A5, A6, A7, A8, A9, A10, A11, A12, A13, A14, A15);

fn bench_tick_dispatch(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
    let mut group = c.benchmark_group("tick_dispatch");

    for count in [1usize, 4, 16] {
        let container = Container::new();
        register_tickers(&container, count);
        let ignition = Ignition::new(container, IgniteConfig::default());
        runtime.block_on(ignition.ignite()).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                runtime.block_on(async {
                    ignition.dispatch_tick(black_box(0.016));
                    tokio::task::yield_now().await;
                })
            })
        });
    }
    group.finish();
}

fn bench_listener_churn(c: &mut Criterion) {
    let container = Container::new();
    register_tickers(&container, 1);
    let instance = container.resolve_by_id("bench/A0").unwrap();
    let listeners = container.listeners();

    c.bench_function("listener_unregister_register", |b| {
        b.iter(|| {
            listeners.unregister(&instance);
            listeners.register(black_box(&instance));
        })
    });
}

criterion_group!(resolution_benches, bench_singleton_hit, bench_singleton_cold);
criterion_group!(dispatch_benches, bench_tick_dispatch, bench_listener_churn);
criterion_main!(resolution_benches, dispatch_benches);
