//! One-shot startup orchestration and per-frame lifecycle dispatch.
//!
//! [`Ignition::ignite`] selects the root types for the configured role,
//! resolves them, orders them, awaits every `OnInit` in that order, wires the
//! live sets of the recurring phases and finally issues every `OnStart`.
//! Afterwards the host (or a [`FrameClock`]) drives the recurring phases
//! through the `dispatch_*` methods.

pub mod clock;
pub(crate) mod order;
pub(crate) mod scheduler;

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use crate::config::{IgniteConfig, Role};
use crate::container::Container;
use crate::instance::{Instance, InstanceId};
use crate::lifecycle::{LifecycleResult, Phase};
use crate::listener::Subscription;
use crate::metadata::{keys, Property};
use crate::{DiError, DiResult, TypeKey};

pub use clock::FrameClock;
pub use order::DEFAULT_LOAD_ORDER;

use scheduler::{Job, TaskPool};

/// Where an [`Ignition`] is in its one-shot startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnitionState {
    NotIgnited,
    Igniting,
    Ignited,
    /// Root resolution or an init handler failed. Terminal.
    Failed,
}

impl fmt::Display for IgnitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IgnitionState::NotIgnited => "not ignited",
            IgnitionState::Igniting => "igniting",
            IgnitionState::Ignited => "ignited",
            IgnitionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

type LiveSet = Arc<Mutex<IndexMap<InstanceId, Arc<Instance>>>>;

/// The ignition orchestrator.
///
/// # Examples
///
/// ```rust
/// use ignite_di::{Container, IgniteConfig, Ignition, IgnitionState, OnStart, LifecycleResult};
/// use async_trait::async_trait;
///
/// struct Server;
///
/// #[async_trait]
/// impl OnStart for Server {
///     async fn on_start(&self) -> LifecycleResult { Ok(()) }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let container = Container::new();
/// container.register::<Server>("net/Server")
///     .service()
///     .constructor(|_| Ok(Server))
///     .on_start()
///     .finish()
///     .unwrap();
///
/// let ignition = Ignition::new(container, IgniteConfig::default());
/// ignition.ignite().await.unwrap();
/// assert_eq!(ignition.state(), IgnitionState::Ignited);
/// assert_eq!(ignition.load_order(), vec!["net/Server".to_string()]);
/// # }
/// ```
pub struct Ignition {
    container: Container,
    config: IgniteConfig,
    state: Mutex<IgnitionState>,
    pool: TaskPool,
    tick: LiveSet,
    physics: LiveSet,
    render: LiveSet,
    order: Mutex<Vec<String>>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl Ignition {
    /// Orchestrator over an existing container. The container keeps its own
    /// depth cap; `config.max_depth` only sizes containers built by
    /// [`Ignition::with_config`].
    pub fn new(container: Container, config: IgniteConfig) -> Self {
        if container.max_depth() != config.max_depth {
            warn!(
                container = container.max_depth(),
                config = config.max_depth,
                "max_depth differs from the container's own cap; the container's cap applies"
            );
        }
        let pool = TaskPool::new(config.max_idle_contexts);
        Self {
            container,
            config,
            state: Mutex::new(IgnitionState::NotIgnited),
            pool,
            tick: LiveSet::default(),
            physics: LiveSet::default(),
            render: LiveSet::default(),
            order: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// Orchestrator over a fresh container sized by `config`.
    pub fn with_config(config: IgniteConfig) -> Self {
        Self::new(Container::with_max_depth(config.max_depth), config)
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn config(&self) -> &IgniteConfig {
        &self.config
    }

    pub fn state(&self) -> IgnitionState {
        *self.state.lock()
    }

    /// Identifiers of the ignited roots, in their final order.
    pub fn load_order(&self) -> Vec<String> {
        self.order.lock().clone()
    }

    /// Live members of a recurring phase. Always zero for `Init` and `Start`.
    pub fn live_count(&self, phase: Phase) -> usize {
        self.live_set(phase).map_or(0, |set| set.lock().len())
    }

    /// Execution contexts created so far by the lifecycle scheduler.
    pub fn contexts_created(&self) -> usize {
        self.pool.contexts_created()
    }

    fn live_set(&self, phase: Phase) -> Option<&LiveSet> {
        match phase {
            Phase::Tick => Some(&self.tick),
            Phase::Physics => Some(&self.physics),
            Phase::Render => Some(&self.render),
            Phase::Init | Phase::Start => None,
        }
    }

    /// Runs the startup sequence. Can only be called once; a second call fails
    /// with `Misuse` and runs nothing.
    ///
    /// Resolution errors and init failures abort ignition and leave it in
    /// [`IgnitionState::Failed`]. Start handlers are issued before this
    /// returns but not awaited.
    pub async fn ignite(&self) -> DiResult<()> {
        {
            let mut state = self.state.lock();
            if *state != IgnitionState::NotIgnited {
                return Err(DiError::misuse(format!("ignite() called twice (state: {})", *state)));
            }
            *state = IgnitionState::Igniting;
        }
        info!(role = %self.config.role, "igniting");

        match self.run().await {
            Ok(()) => {
                *self.state.lock() = IgnitionState::Ignited;
                info!(roots = self.order.lock().len(), "ignited");
                Ok(())
            }
            Err(err) => {
                *self.state.lock() = IgnitionState::Failed;
                error!(error = %err, "ignition failed");
                Err(err)
            }
        }
    }

    async fn run(&self) -> DiResult<()> {
        if let Ok(handle) = Handle::try_current() {
            self.pool.bind(handle);
        }

        let roots = self.select_roots();
        let mut instances = Vec::with_capacity(roots.len());
        for ty in roots {
            instances.push(self.container.resolve_singleton(ty)?);
        }

        let ordered = order::sort_for_ignition(self.container.metadata(), instances);
        *self.order.lock() = ordered.iter().map(|i| i.identifier().to_owned()).collect();

        for instance in &ordered {
            let Some(handler) = instance.capabilities().init.clone() else {
                continue;
            };
            debug!(identifier = instance.identifier(), "init");
            let outcome = AssertUnwindSafe(handler.on_init()).catch_unwind().await;
            if let Some(message) = failure_message(outcome) {
                self.container
                    .observers()
                    .lifecycle_failed(instance.identifier(), Phase::Init, &message);
                return Err(DiError::Lifecycle {
                    identifier: instance.identifier().to_owned(),
                    phase: Phase::Init.name(),
                    message,
                });
            }
        }

        self.wire(Phase::Tick);
        self.wire(Phase::Physics);
        if self.config.role == Role::Client {
            self.wire(Phase::Render);
        }

        for instance in &ordered {
            let Some(handler) = instance.capabilities().start.clone() else {
                continue;
            };
            self.issue(instance, Phase::Start, async move { handler.on_start().await }.boxed());
        }
        Ok(())
    }

    fn select_roots(&self) -> Vec<TypeKey> {
        let metadata = self.container.metadata();
        let role = self.config.role.as_str();
        let mut roots = Vec::new();

        for (identifier, ty) in metadata.identified() {
            let marked = metadata
                .get_own(ty, keys::SINGLETON, &Property::Type)
                .and_then(|v| v.as_str().map(|r| r == role))
                .unwrap_or(false);
            if !marked {
                continue;
            }
            let optional = metadata
                .get_own(ty, keys::OPTIONAL, &Property::Type)
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            if optional && !self.config.includes_optional(&identifier) {
                debug!(identifier = %identifier, "skipped: optional");
                continue;
            }
            let external = metadata
                .get_own(ty, keys::EXTERNAL, &Property::Type)
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            if external && !self.container.is_external_registered(ty) {
                debug!(identifier = %identifier, "skipped: external class not registered");
                continue;
            }
            if !self.config.is_allowed(&identifier) && !self.container.is_patched(ty) {
                debug!(identifier = %identifier, "skipped: not on allow-list");
                continue;
            }
            debug!(identifier = %identifier, "selected");
            roots.push(ty);
        }
        roots
    }

    fn wire(&self, phase: Phase) {
        let Some(live) = self.live_set(phase) else {
            return;
        };
        let listeners = self.container.listeners();

        let added = live.clone();
        let on_added = listeners.on_added(
            move |instance| {
                added.lock().insert(instance.id(), instance.clone());
            },
            Some(phase.listener_id()),
        );
        let removed = live.clone();
        let on_removed = listeners.on_removed(
            move |instance| {
                removed.lock().shift_remove(&instance.id());
            },
            Some(phase.listener_id()),
        );
        self.subscriptions.lock().extend([on_added, on_removed]);
    }

    fn snapshot(&self, live: &LiveSet) -> Vec<Arc<Instance>> {
        live.lock().values().cloned().collect()
    }

    /// Issues one handler call on its own execution context. Failures and
    /// panics are logged and reported to observers, never propagated.
    fn issue(&self, instance: &Instance, phase: Phase, call: BoxFuture<'static, LifecycleResult>) {
        let identifier = instance.identifier().to_owned();
        let container = self.container.clone();
        let job: Job = async move {
            let outcome = AssertUnwindSafe(call).catch_unwind().await;
            if let Some(message) = failure_message(outcome) {
                error!(identifier = %identifier, phase = %phase, error = %message, "lifecycle handler failed");
                container.observers().lifecycle_failed(&identifier, phase, &message);
            }
        }
        .boxed();
        self.pool.spawn(job);
    }

    /// Post-physics frame signal.
    pub fn dispatch_tick(&self, dt: f64) {
        for instance in self.snapshot(&self.tick) {
            if let Some(handler) = instance.capabilities().tick.clone() {
                self.issue(&instance, Phase::Tick, async move { handler.on_tick(dt).await }.boxed());
            }
        }
    }

    /// Pre-physics frame signal with the absolute simulation time.
    pub fn dispatch_physics(&self, dt: f64, time: f64) {
        for instance in self.snapshot(&self.physics) {
            if let Some(handler) = instance.capabilities().physics.clone() {
                self.issue(
                    &instance,
                    Phase::Physics,
                    async move { handler.on_physics(dt, time).await }.boxed(),
                );
            }
        }
    }

    /// Pre-render frame signal. A no-op for the server role.
    pub fn dispatch_render(&self, dt: f64) {
        for instance in self.snapshot(&self.render) {
            if let Some(handler) = instance.capabilities().render.clone() {
                self.issue(&instance, Phase::Render, async move { handler.on_render(dt).await }.boxed());
            }
        }
    }
}

impl Drop for Ignition {
    fn drop(&mut self) {
        for subscription in self.subscriptions.get_mut().drain(..) {
            subscription.disconnect();
        }
    }
}

impl fmt::Debug for Ignition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ignition")
            .field("role", &self.config.role)
            .field("state", &self.state())
            .field("tick", &self.live_count(Phase::Tick))
            .field("physics", &self.live_count(Phase::Physics))
            .field("render", &self.live_count(Phase::Render))
            .finish()
    }
}

fn failure_message(outcome: Result<LifecycleResult, Box<dyn Any + Send>>) -> Option<String> {
    match outcome {
        Ok(Ok(())) => None,
        Ok(Err(err)) => Some(err.to_string()),
        Err(panic) => Some(panic_message(&*panic)),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(text) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", text)
    } else if let Some(text) = panic.downcast_ref::<String>() {
        format!("panicked: {}", text)
    } else {
        "panicked".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_become_messages() {
        let outcome: Result<LifecycleResult, Box<dyn Any + Send>> = Err(Box::new("boom"));
        assert_eq!(failure_message(outcome).as_deref(), Some("panicked: boom"));
        let outcome: Result<LifecycleResult, Box<dyn Any + Send>> = Ok(Err("bad config".into()));
        assert_eq!(failure_message(outcome).as_deref(), Some("bad config"));
        assert_eq!(failure_message(Ok(Ok(()))), None);
    }

    #[test]
    fn state_display() {
        assert_eq!(IgnitionState::NotIgnited.to_string(), "not ignited");
        assert_eq!(IgnitionState::Failed.to_string(), "failed");
    }
}
