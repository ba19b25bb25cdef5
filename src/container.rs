//! Dependency container: lazily built, cached singletons with recursive
//! constructor injection.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::instance::{AnyArc, Instance};
use crate::internal::LoadingGuard;
use crate::listener::ListenerRegistry;
use crate::metadata::{keys, MetadataStore, Property};
use crate::observer::{DiObserver, Observers};
use crate::registration::{Args, Registration, TypeBuilder};
use crate::{DiError, DiResult, TypeKey};

const DEFAULT_MAX_DEPTH: usize = 1024;

/// Reserved prefix of identifiers that embed a literal value.
pub const PRIMITIVE_PREFIX: &str = "$p:";

/// Literal decoded from a primitive-encoded identifier.
///
/// `$p:s:<text>` is a string, `$p:n:<number>` a number and
/// `$p:b:<true|false>` a boolean. Anything else after the prefix is kept
/// as `Raw` and only resolves through a caller-supplied primitive handler.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Str(String),
    Number(f64),
    Bool(bool),
    Raw(String),
}

impl Primitive {
    /// Decodes `identifier`, or returns `None` when it lacks the prefix.
    pub fn decode(identifier: &str) -> Option<Primitive> {
        let body = identifier.strip_prefix(PRIMITIVE_PREFIX)?;
        let decoded = match body.split_once(':') {
            Some(("s", text)) => Primitive::Str(text.to_owned()),
            Some(("n", number)) => match number.parse() {
                Ok(n) => Primitive::Number(n),
                Err(_) => Primitive::Raw(body.to_owned()),
            },
            Some(("b", "true")) => Primitive::Bool(true),
            Some(("b", "false")) => Primitive::Bool(false),
            _ => Primitive::Raw(body.to_owned()),
        };
        Some(decoded)
    }

    /// Encodes a string literal as an identifier.
    pub fn encode_str(text: &str) -> String {
        format!("{}s:{}", PRIMITIVE_PREFIX, text)
    }

    /// Encodes a number literal as an identifier.
    pub fn encode_number(number: f64) -> String {
        format!("{}n:{}", PRIMITIVE_PREFIX, number)
    }

    fn into_value(self) -> Option<AnyArc> {
        match self {
            Primitive::Str(s) => Some(Arc::new(s)),
            Primitive::Number(n) => Some(Arc::new(n)),
            Primitive::Bool(b) => Some(Arc::new(b)),
            Primitive::Raw(_) => None,
        }
    }
}

/// One constructor parameter being resolved.
#[derive(Debug, Clone)]
pub struct DependencyRequest<'a> {
    /// Type whose constructor needs the value.
    pub owner: TypeKey,
    /// Identifier (or short name) of `owner`.
    pub owner_id: &'a str,
    /// Dependency identifier declared at `position`.
    pub identifier: &'a str,
    pub position: usize,
}

/// Factory installed by [`Container::register_override`].
pub type OverrideFactory = Arc<dyn Fn(&DependencyRequest<'_>) -> AnyArc + Send + Sync>;

/// A global resolution override: a literal value or a factory.
#[derive(Clone)]
pub enum Override {
    Value(AnyArc),
    Factory(OverrideFactory),
}

impl Override {
    pub fn value<V: Any + Send + Sync>(value: V) -> Self {
        Override::Value(Arc::new(value))
    }

    pub fn factory<F>(factory: F) -> Self
    where
        F: Fn(&DependencyRequest<'_>) -> AnyArc + Send + Sync + 'static,
    {
        Override::Factory(Arc::new(factory))
    }

    fn into_factory(self) -> OverrideFactory {
        match self {
            Override::Value(value) => Arc::new(move |_: &DependencyRequest<'_>| value.clone()),
            Override::Factory(factory) => factory,
        }
    }
}

impl fmt::Debug for Override {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Override::Value(_) => f.write_str("Override::Value(..)"),
            Override::Factory(_) => f.write_str("Override::Factory(..)"),
        }
    }
}

type Handler<'a> = Box<dyn Fn(&DependencyRequest<'_>) -> Option<AnyArc> + 'a>;
type PrimitiveHandler<'a> = Box<dyn Fn(&DependencyRequest<'_>, &Primitive) -> Option<AnyArc> + 'a>;

/// Per-call resolution hooks for [`Container::create_dependency`]. They apply
/// to the constructed type's own parameters only, not to singletons resolved
/// further down the graph.
#[derive(Default)]
pub struct ResolveOptions<'a> {
    handle: Option<Handler<'a>>,
    handle_primitive: Option<PrimitiveHandler<'a>>,
}

impl<'a> ResolveOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consulted first for every parameter; `None` falls through.
    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&DependencyRequest<'_>) -> Option<AnyArc> + 'a,
    {
        self.handle = Some(Box::new(handler));
        self
    }

    /// Consulted for primitive-encoded identifiers; `None` falls back to the
    /// decoded literal.
    pub fn with_primitive_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&DependencyRequest<'_>, &Primitive) -> Option<AnyArc> + 'a,
    {
        self.handle_primitive = Some(Box::new(handler));
        self
    }
}

struct ContainerInner {
    metadata: MetadataStore,
    listeners: ListenerRegistry,
    registrations: RwLock<HashMap<TypeKey, Registration>>,
    singletons: Mutex<HashMap<TypeKey, Arc<Instance>>>,
    overrides: RwLock<HashMap<String, OverrideFactory>>,
    patches: Mutex<HashMap<TypeKey, AnyArc>>,
    externals: RwLock<HashSet<TypeKey>>,
    loading: Mutex<Vec<TypeKey>>,
    observers: Observers,
    max_depth: usize,
}

/// Resolves types to lazily created, cached singletons.
///
/// The container is the context object owning the metadata store, the
/// listener registry and the singleton cache. Clones share the same state;
/// independent containers never see each other's registrations.
///
/// Construction is synchronous and uses one loading stack per container, so a
/// container must not be resolving on several threads at once.
///
/// # Examples
///
/// ```
/// use ignite_di::{Container, Override};
///
/// struct Greeter { greeting: String, volume: f64 }
///
/// let container = Container::new();
/// container.register_override("config/volume", Override::value(11.0f64));
/// container.register::<Greeter>("demo/Greeter")
///     .depends_on(["$p:s:hello", "config/volume"])
///     .constructor(|args| Ok(Greeter { greeting: args.string(0)?, volume: args.number(1)? }))
///     .finish()
///     .unwrap();
///
/// let greeter = container.resolve::<Greeter>().unwrap();
/// assert_eq!(greeter.greeting, "hello");
/// assert_eq!(greeter.volume, 11.0);
/// ```
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl Container {
    pub fn new() -> Self {
        Self::with_max_depth(DEFAULT_MAX_DEPTH)
    }

    /// Container whose construction depth is capped at `max_depth`.
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            inner: Arc::new(ContainerInner {
                metadata: MetadataStore::new(),
                listeners: ListenerRegistry::new(),
                registrations: RwLock::new(HashMap::new()),
                singletons: Mutex::new(HashMap::new()),
                overrides: RwLock::new(HashMap::new()),
                patches: Mutex::new(HashMap::new()),
                externals: RwLock::new(HashSet::new()),
                loading: Mutex::new(Vec::new()),
                observers: Observers::default(),
                max_depth,
            }),
        }
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.inner.metadata
    }

    /// Construction depth at which resolution fails with `DepthExceeded`.
    pub fn max_depth(&self) -> usize {
        self.inner.max_depth
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.inner.listeners
    }

    pub fn add_observer(&self, observer: Arc<dyn DiObserver>) {
        self.inner.observers.add(observer);
    }

    pub(crate) fn observers(&self) -> &Observers {
        &self.inner.observers
    }

    // ----- Registration -----

    /// Starts registering `T` under a globally unique identifier.
    pub fn register<T: Any + Send + Sync>(&self, identifier: impl Into<String>) -> TypeBuilder<'_, T> {
        TypeBuilder::new(self, Some(identifier.into()))
    }

    /// Starts registering `T` without an identifier. Such types can be built
    /// with [`create_dependency`](Self::create_dependency) but cannot be
    /// named as a dependency.
    pub fn register_type<T: Any + Send + Sync>(&self) -> TypeBuilder<'_, T> {
        TypeBuilder::new(self, None)
    }

    pub(crate) fn install(&self, ty: TypeKey, registration: Registration) {
        self.inner.registrations.write().insert(ty, registration);
    }

    /// Permanently installs an override for `identifier`. A plain value is
    /// wrapped as a constant-returning factory.
    pub fn register_override(&self, identifier: impl Into<String>, value: Override) {
        self.inner.overrides.write().insert(identifier.into(), value.into_factory());
    }

    /// Allows an `external` type to be ignited.
    pub fn register_external_class(&self, ty: TypeKey) {
        self.inner.externals.write().insert(ty);
    }

    pub fn is_external_registered(&self, ty: TypeKey) -> bool {
        self.inner.externals.read().contains(&ty)
    }

    /// Replaces the singleton behind `identifier` with `value` before it is
    /// first resolved. Intended for tests.
    pub fn patch_dependency<V: Any + Send + Sync>(&self, identifier: &str, value: V) -> DiResult<()> {
        let ty = self
            .inner
            .metadata
            .type_of(identifier)
            .ok_or_else(|| DiError::misuse(format!("cannot patch '{}': no type has this identifier", identifier)))?;
        if self.is_resolved(ty) {
            return Err(DiError::misuse(format!("cannot patch '{}': it was already resolved", identifier)));
        }
        self.inner.patches.lock().insert(ty, Arc::new(value));
        debug!(identifier, "dependency patched");
        Ok(())
    }

    pub fn is_patched(&self, ty: TypeKey) -> bool {
        self.inner.patches.lock().contains_key(&ty)
    }

    pub fn is_resolved(&self, ty: TypeKey) -> bool {
        self.inner.singletons.lock().contains_key(&ty)
    }

    // ----- Resolution -----

    /// Returns the singleton for `ty`, constructing, caching and announcing it
    /// to the listener registry on first use.
    pub fn resolve_singleton(&self, ty: TypeKey) -> DiResult<Arc<Instance>> {
        if let Some(existing) = self.inner.singletons.lock().get(&ty) {
            return Ok(existing.clone());
        }

        let identifier = self.inner.metadata.describe(ty);
        let observed = self.inner.observers.has_observers();
        let started = Instant::now();
        if observed {
            self.inner.observers.resolving(ty, &identifier);
        }

        let patched = self.inner.patches.lock().get(&ty).cloned();
        let built = match patched {
            Some(value) => {
                let registration = self.registration(ty).unwrap_or_default();
                self.instantiate(ty, identifier.clone(), value, &registration)
            }
            None => self.create_dependency(ty, &ResolveOptions::default())?,
        };

        // First constructed instance wins; a racing construction is discarded.
        let (instance, fresh) = {
            let mut cache = self.inner.singletons.lock();
            match cache.get(&ty) {
                Some(existing) => (existing.clone(), false),
                None => {
                    cache.insert(ty, built.clone());
                    (built, true)
                }
            }
        };

        if fresh {
            debug!(identifier = %identifier, "singleton resolved");
            self.inner.listeners.register(&instance);
            if observed {
                self.inner.observers.resolved(ty, &identifier, started.elapsed());
            }
        }
        Ok(instance)
    }

    /// Builds a fresh instance of `ty` without caching or announcing it.
    ///
    /// Fails with `Circular` when `ty` is already under construction and with
    /// `Unresolved` when a parameter cannot be satisfied.
    pub fn create_dependency(&self, ty: TypeKey, options: &ResolveOptions<'_>) -> DiResult<Arc<Instance>> {
        let metadata = &self.inner.metadata;
        let _guard = LoadingGuard::enter(&self.inner.loading, ty, self.inner.max_depth, |t| metadata.describe(t))?;

        let owner_id = metadata.describe(ty);
        let registration = self.registration(ty).ok_or_else(|| DiError::NotConstructible(owner_id.clone()))?;
        let ctor = registration
            .ctor
            .clone()
            .ok_or_else(|| DiError::NotConstructible(owner_id.clone()))?;

        let parameters = metadata
            .get(ty, keys::PARAMETERS, &Property::Type)
            .map(|v| v.string_items())
            .unwrap_or_default();
        let mut values = Vec::with_capacity(parameters.len());
        for (position, dependency) in parameters.iter().enumerate() {
            values.push(self.resolve_dependency_value(ty, &owner_id, dependency, position, options)?);
        }

        let value = ctor(&Args::new(owner_id.clone(), values))?;
        Ok(self.instantiate(ty, owner_id, value, &registration))
    }

    /// Resolves one constructor parameter. First match wins: the per-call
    /// handler, a global override, a primitive literal, then the singleton of
    /// the identified type.
    pub fn resolve_dependency_value(
        &self,
        owner: TypeKey,
        owner_id: &str,
        identifier: &str,
        position: usize,
        options: &ResolveOptions<'_>,
    ) -> DiResult<AnyArc> {
        let request = DependencyRequest { owner, owner_id, identifier, position };

        if let Some(handle) = &options.handle {
            if let Some(value) = handle(&request) {
                return Ok(value);
            }
        }

        let factory = self.inner.overrides.read().get(identifier).cloned();
        if let Some(factory) = factory {
            return Ok(factory(&request));
        }

        if let Some(primitive) = Primitive::decode(identifier) {
            if let Some(handle) = &options.handle_primitive {
                if let Some(value) = handle(&request, &primitive) {
                    return Ok(value);
                }
            }
            return primitive.into_value().ok_or_else(|| unresolved(identifier, owner_id));
        }

        match self.inner.metadata.type_of(identifier) {
            Some(ty) => Ok(self.resolve_singleton(ty)?.value().clone()),
            None => Err(unresolved(identifier, owner_id)),
        }
    }

    // ----- Typed helpers -----

    /// Singleton of the Rust type `T`.
    pub fn resolve<T: Any + Send + Sync>(&self) -> DiResult<Arc<T>> {
        let ty = TypeKey::of::<T>();
        let instance = self.resolve_singleton(ty)?;
        instance.downcast::<T>().ok_or_else(|| DiError::TypeMismatch {
            owner: instance.identifier().to_owned(),
            position: 0,
            expected: std::any::type_name::<T>(),
        })
    }

    /// Singleton of the type registered under `identifier`.
    pub fn resolve_by_id(&self, identifier: &str) -> DiResult<Arc<Instance>> {
        let ty = self
            .inner
            .metadata
            .type_of(identifier)
            .ok_or_else(|| unresolved(identifier, "<root>"))?;
        self.resolve_singleton(ty)
    }

    /// Transient instance of `T`, built with `options`.
    pub fn construct<T: Any + Send + Sync>(&self, options: &ResolveOptions<'_>) -> DiResult<Arc<T>> {
        let instance = self.create_dependency(TypeKey::of::<T>(), options)?;
        instance.downcast::<T>().ok_or_else(|| DiError::TypeMismatch {
            owner: instance.identifier().to_owned(),
            position: 0,
            expected: std::any::type_name::<T>(),
        })
    }

    /// Every cached singleton, in no particular order.
    pub fn singletons(&self) -> Vec<Arc<Instance>> {
        self.inner.singletons.lock().values().cloned().collect()
    }

    fn registration(&self, ty: TypeKey) -> Option<Registration> {
        self.inner.registrations.read().get(&ty).cloned()
    }

    fn instantiate(&self, ty: TypeKey, identifier: String, value: AnyArc, registration: &Registration) -> Arc<Instance> {
        let mut markers: Vec<String> = Vec::new();
        for list in self.inner.metadata.get_all(ty, keys::IMPLEMENTS, &Property::Type) {
            for marker in list.string_items() {
                if !markers.contains(&marker) {
                    markers.push(marker);
                }
            }
        }
        let capabilities = registration.casters.capabilities(&value);
        Arc::new(Instance::new(ty, identifier, value, capabilities, markers))
    }
}

fn unresolved(identifier: &str, requested_by: &str) -> DiError {
    DiError::Unresolved { identifier: identifier.to_owned(), requested_by: requested_by.to_owned() }
}
