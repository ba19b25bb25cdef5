use async_trait::async_trait;
use ignite_di::{Container, Instance, LifecycleResult, ListenerRegistry, OnPhysics, OnTick, Phase};
use std::sync::{Arc, Mutex};

struct Wheel;

#[async_trait]
impl OnTick for Wheel {
    async fn on_tick(&self, _dt: f64) -> LifecycleResult {
        Ok(())
    }
}

#[async_trait]
impl OnPhysics for Wheel {
    async fn on_physics(&self, _dt: f64, _time: f64) -> LifecycleResult {
        Ok(())
    }
}

struct Sign;

fn container() -> Container {
    let container = Container::new();
    container
        .register::<Wheel>("car/Wheel")
        .implements(["Rolling", "Audited"])
        .constructor(|_| Ok(Wheel))
        .on_tick()
        .on_physics()
        .finish()
        .unwrap();
    container
        .register::<Sign>("road/Sign")
        .implements(["Audited"])
        .constructor(|_| Ok(Sign))
        .finish()
        .unwrap();
    container
}

type Seen = Arc<Mutex<Vec<String>>>;

fn recorder(seen: &Seen) -> impl Fn(&Arc<Instance>) + Send + Sync + 'static {
    let seen = seen.clone();
    move |instance: &Arc<Instance>| seen.lock().unwrap().push(instance.identifier().to_owned())
}

#[test]
fn resolved_singletons_join_their_interest_sets() {
    let container = container();
    let wheel = container.resolve_by_id("car/Wheel").unwrap();
    let sign = container.resolve_by_id("road/Sign").unwrap();
    let listeners = container.listeners();

    assert_eq!(listeners.len(), 2);
    assert!(listeners.is_registered(&wheel));
    assert_eq!(listeners.members(Phase::Tick.listener_id()).len(), 1);
    assert_eq!(listeners.members(Phase::Physics.listener_id()).len(), 1);
    assert!(listeners.members(Phase::Render.listener_id()).is_empty());

    let audited: Vec<String> = listeners.members("Audited").iter().map(|i| i.identifier().to_owned()).collect();
    assert_eq!(audited, ["car/Wheel", "road/Sign"]);
    assert!(Arc::ptr_eq(&listeners.members("Rolling")[0], &wheel));
    assert!(!Arc::ptr_eq(&listeners.members("Audited")[1], &wheel));
    assert!(Arc::ptr_eq(&listeners.members("Audited")[1], &sign));
}

#[test]
fn unregister_leaves_every_set() {
    let container = container();
    let wheel = container.resolve_by_id("car/Wheel").unwrap();
    let listeners = container.listeners();

    assert!(listeners.unregister(&wheel));
    for interest in [Phase::Tick.listener_id(), Phase::Physics.listener_id(), "Rolling", "Audited"] {
        assert!(listeners.members(interest).is_empty(), "{interest} still has members");
    }
    assert!(!listeners.unregister(&wheel));
    assert!(listeners.is_empty());
}

#[test]
fn scoped_events_fire_per_set_and_global_events_once() {
    let container = container();
    let listeners = container.listeners();
    let audited = Seen::default();
    let global = Seen::default();
    let removed = Seen::default();
    let _a = listeners.on_added(recorder(&audited), Some("Audited"));
    let _g = listeners.on_added(recorder(&global), None);
    let _r = listeners.on_removed(recorder(&removed), Some("Rolling"));

    let wheel = container.resolve_by_id("car/Wheel").unwrap();
    container.resolve_by_id("road/Sign").unwrap();
    listeners.unregister(&wheel);

    assert_eq!(*audited.lock().unwrap(), ["car/Wheel", "road/Sign"]);
    assert_eq!(*global.lock().unwrap(), ["car/Wheel", "road/Sign"]);
    assert_eq!(*removed.lock().unwrap(), ["car/Wheel"]);
}

#[test]
fn late_subscribers_see_existing_members() {
    let container = container();
    container.resolve_by_id("car/Wheel").unwrap();
    container.resolve_by_id("road/Sign").unwrap();

    let ticking = Seen::default();
    let _sub = container.listeners().on_added(recorder(&ticking), Some(Phase::Tick.listener_id()));
    assert_eq!(*ticking.lock().unwrap(), ["car/Wheel"]);
}

#[test]
fn disconnected_subscriptions_stop_firing() {
    let container = container();
    let seen = Seen::default();
    let sub = container.listeners().on_added(recorder(&seen), None);
    container.resolve_by_id("car/Wheel").unwrap();
    sub.disconnect();
    container.resolve_by_id("road/Sign").unwrap();
    assert_eq!(*seen.lock().unwrap(), ["car/Wheel"]);
}

#[test]
fn registering_twice_only_adds_new_interests() {
    let container = container();
    let wheel = container.resolve_by_id("car/Wheel").unwrap();
    let registry: &ListenerRegistry = container.listeners();
    let seen = Seen::default();
    let _sub = registry.on_added(recorder(&seen), None);
    seen.lock().unwrap().clear();

    registry.register(&wheel);
    assert_eq!(*seen.lock().unwrap(), ["car/Wheel"]);
    assert_eq!(registry.members("Rolling").len(), 1);
    assert_eq!(registry.len(), 1);
}

#[test]
fn transient_instances_can_be_attached_and_detached() {
    let container = container();
    let wheel = container
        .create_dependency(ignite_di::key_of_type::<Wheel>(), &ignite_di::ResolveOptions::default())
        .unwrap();
    let listeners = container.listeners();
    assert!(!listeners.is_registered(&wheel));

    listeners.register(&wheel);
    assert_eq!(listeners.members(Phase::Tick.listener_id()).len(), 1);
    listeners.unregister(&wheel);
    assert!(listeners.members(Phase::Tick.listener_id()).is_empty());
}
