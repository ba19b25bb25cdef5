//! Registration surface: the builder that writes type markers into the
//! metadata store and installs constructors and capability casters.

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::config::Role;
use crate::container::Container;
use crate::instance::{AnyArc, Capabilities};
use crate::lifecycle::{OnInit, OnPhysics, OnRender, OnStart, OnTick};
use crate::metadata::{keys, MetaValue, Property};
use crate::{DiError, DiResult, TypeKey};

pub(crate) type Ctor = Arc<dyn Fn(&Args) -> DiResult<AnyArc> + Send + Sync>;

type Caster<H> = Arc<dyn Fn(&AnyArc) -> Option<Arc<H>> + Send + Sync>;

/// Turns a type-erased value back into its lifecycle handlers. Built while `T`
/// is still known, so checking a phase later never inspects the value's type.
#[derive(Clone, Default)]
pub(crate) struct Casters {
    init: Option<Caster<dyn OnInit>>,
    start: Option<Caster<dyn OnStart>>,
    tick: Option<Caster<dyn OnTick>>,
    physics: Option<Caster<dyn OnPhysics>>,
    render: Option<Caster<dyn OnRender>>,
}

impl Casters {
    pub(crate) fn capabilities(&self, value: &AnyArc) -> Capabilities {
        Capabilities {
            init: self.init.as_ref().and_then(|c| c(value)),
            start: self.start.as_ref().and_then(|c| c(value)),
            tick: self.tick.as_ref().and_then(|c| c(value)),
            physics: self.physics.as_ref().and_then(|c| c(value)),
            render: self.render.as_ref().and_then(|c| c(value)),
        }
    }
}

/// Constructor and capability casters of one registered type.
#[derive(Clone, Default)]
pub(crate) struct Registration {
    pub(crate) ctor: Option<Ctor>,
    pub(crate) casters: Casters,
}

/// Resolved constructor arguments, in parameter order.
pub struct Args {
    owner: String,
    values: Vec<AnyArc>,
}

impl Args {
    pub(crate) fn new(owner: String, values: Vec<AnyArc>) -> Self {
        Self { owner, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get_any(&self, position: usize) -> DiResult<&AnyArc> {
        self.values.get(position).ok_or_else(|| {
            DiError::misuse(format!(
                "constructor of '{}' read argument {} but only {} were declared",
                self.owner,
                position,
                self.values.len()
            ))
        })
    }

    /// Downcasts the argument at `position`.
    pub fn get<T: Any + Send + Sync>(&self, position: usize) -> DiResult<Arc<T>> {
        self.get_any(position)?
            .clone()
            .downcast::<T>()
            .map_err(|_| DiError::TypeMismatch {
                owner: self.owner.clone(),
                position,
                expected: std::any::type_name::<T>(),
            })
    }

    /// String literal argument, as produced by a `$p:s:` identifier.
    pub fn string(&self, position: usize) -> DiResult<String> {
        self.get::<String>(position).map(|s| (*s).clone())
    }

    /// Number literal argument, as produced by a `$p:n:` identifier.
    pub fn number(&self, position: usize) -> DiResult<f64> {
        self.get::<f64>(position).map(|n| *n)
    }

    /// Boolean literal argument, as produced by a `$p:b:` identifier.
    pub fn boolean(&self, position: usize) -> DiResult<bool> {
        self.get::<bool>(position).map(|b| *b)
    }
}

/// Declares a type's markers, constructor and lifecycle capabilities.
///
/// Nothing is written until [`TypeBuilder::finish`].
///
/// # Examples
///
/// ```rust
/// use ignite_di::{Container, OnInit, LifecycleResult};
/// use async_trait::async_trait;
///
/// struct Logger;
/// struct Game { logger: std::sync::Arc<Logger> }
///
/// #[async_trait]
/// impl OnInit for Game {
///     async fn on_init(&self) -> LifecycleResult { Ok(()) }
/// }
///
/// let container = Container::new();
/// container.register::<Logger>("game/Logger")
///     .service()
///     .constructor(|_| Ok(Logger))
///     .finish()
///     .unwrap();
/// container.register::<Game>("game/Game")
///     .service()
///     .depends_on(["game/Logger"])
///     .constructor(|args| Ok(Game { logger: args.get(0)? }))
///     .on_init()
///     .finish()
///     .unwrap();
///
/// let game = container.resolve::<Game>().unwrap();
/// let logger = container.resolve::<Logger>().unwrap();
/// assert!(std::sync::Arc::ptr_eq(&game.logger, &logger));
/// ```
#[must_use = "call finish() to commit the registration"]
pub struct TypeBuilder<'c, T> {
    container: &'c Container,
    identifier: Option<String>,
    parent: Option<TypeKey>,
    entries: Vec<(String, MetaValue)>,
    implements: Vec<String>,
    registration: Registration,
    _type: PhantomData<fn() -> T>,
}

impl<'c, T: Any + Send + Sync> TypeBuilder<'c, T> {
    pub(crate) fn new(container: &'c Container, identifier: Option<String>) -> Self {
        Self {
            container,
            identifier,
            parent: None,
            entries: Vec::new(),
            implements: Vec::new(),
            registration: Registration::default(),
            _type: PhantomData,
        }
    }

    fn set(mut self, key: &str, value: MetaValue) -> Self {
        self.entries.retain(|(k, _)| k != key);
        self.entries.push((key.to_owned(), value));
        self
    }

    /// Singleton for the server role.
    pub fn service(self) -> Self {
        self.singleton_for(Role::Server)
    }

    /// Singleton for the client role.
    pub fn controller(self) -> Self {
        self.singleton_for(Role::Client)
    }

    pub fn singleton_for(self, role: Role) -> Self {
        self.set(keys::SINGLETON, role.as_str().into())
    }

    pub fn load_order(self, order: i64) -> Self {
        self.set(keys::LOAD_ORDER, MetaValue::Int(order))
    }

    /// Constructor dependency identifiers, one per parameter position.
    pub fn depends_on<I, S>(self, identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: Vec<MetaValue> = identifiers.into_iter().map(|s| MetaValue::Str(s.into())).collect();
        self.set(keys::PARAMETERS, MetaValue::List(ids))
    }

    pub fn optional(self) -> Self {
        self.set(keys::OPTIONAL, MetaValue::Bool(true))
    }

    pub fn external(self) -> Self {
        self.set(keys::EXTERNAL, MetaValue::Bool(true))
    }

    /// Marker interfaces; repeated calls accumulate.
    pub fn implements<I, S>(mut self, identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for id in identifiers {
            let id = id.into();
            if !self.implements.contains(&id) {
                self.implements.push(id);
            }
        }
        self
    }

    /// Links `T` to its single parent type for metadata inheritance.
    pub fn parent<P: ?Sized + 'static>(mut self) -> Self {
        self.parent = Some(TypeKey::of::<P>());
        self
    }

    /// Arbitrary type-level metadata.
    pub fn metadata(self, key: &str, value: impl Into<MetaValue>) -> Self {
        self.set(key, value.into())
    }

    pub fn constructor<F>(mut self, ctor: F) -> Self
    where
        F: Fn(&Args) -> DiResult<T> + Send + Sync + 'static,
    {
        self.registration.ctor = Some(Arc::new(move |args: &Args| -> DiResult<AnyArc> {
            Ok(Arc::new(ctor(args)?))
        }));
        self
    }

    /// Commits the registration and returns the type's key.
    ///
    /// Fails with `RegistrationConflict` when the identifier is taken, and with
    /// `Misuse` when `T` was already resolved (identifiers must be assigned
    /// before first resolution) or the parent link is invalid. Every check runs
    /// before anything is written, so a failed registration can be retried.
    pub fn finish(self) -> DiResult<TypeKey> {
        let ty = TypeKey::of::<T>();
        let metadata = self.container.metadata();
        if self.container.is_resolved(ty) {
            return Err(DiError::misuse(format!("{} was registered after its first resolution", ty.name())));
        }

        let mut identifier = self.identifier;
        let mut entries = self.entries;
        if let Some(position) = entries.iter().position(|(k, _)| k == keys::IDENTIFIER) {
            let (_, value) = entries.remove(position);
            match value {
                MetaValue::Str(id) if identifier.is_none() => identifier = Some(id),
                _ => {
                    return Err(DiError::misuse(format!(
                        "identifier of {} must be a single string given to register()",
                        ty.name()
                    )))
                }
            }
        }
        if let Some(identifier) = &identifier {
            metadata.check_identifier(ty, identifier)?;
        }
        if let Some(parent) = self.parent {
            metadata.check_parent(ty, parent)?;
        }

        if let Some(identifier) = identifier {
            metadata.define(ty, keys::IDENTIFIER, MetaValue::Str(identifier), Property::Type)?;
        }
        if let Some(parent) = self.parent {
            metadata.set_parent(ty, parent)?;
        }
        metadata.define_batch(ty, entries, Property::Type)?;
        if !self.implements.is_empty() {
            metadata.define(ty, keys::IMPLEMENTS, self.implements.into(), Property::Type)?;
        }
        self.container.install(ty, self.registration);
        Ok(ty)
    }
}

impl<'c, T: OnInit + Any> TypeBuilder<'c, T> {
    pub fn on_init(mut self) -> Self {
        self.registration.casters.init =
            Some(Arc::new(|v: &AnyArc| v.clone().downcast::<T>().ok().map(|t| t as Arc<dyn OnInit>)));
        self
    }
}

impl<'c, T: OnStart + Any> TypeBuilder<'c, T> {
    pub fn on_start(mut self) -> Self {
        self.registration.casters.start =
            Some(Arc::new(|v: &AnyArc| v.clone().downcast::<T>().ok().map(|t| t as Arc<dyn OnStart>)));
        self
    }
}

impl<'c, T: OnTick + Any> TypeBuilder<'c, T> {
    pub fn on_tick(mut self) -> Self {
        self.registration.casters.tick =
            Some(Arc::new(|v: &AnyArc| v.clone().downcast::<T>().ok().map(|t| t as Arc<dyn OnTick>)));
        self
    }
}

impl<'c, T: OnPhysics + Any> TypeBuilder<'c, T> {
    pub fn on_physics(mut self) -> Self {
        self.registration.casters.physics =
            Some(Arc::new(|v: &AnyArc| v.clone().downcast::<T>().ok().map(|t| t as Arc<dyn OnPhysics>)));
        self
    }
}

impl<'c, T: OnRender + Any> TypeBuilder<'c, T> {
    pub fn on_render(mut self) -> Self {
        self.registration.casters.render =
            Some(Arc::new(|v: &AnyArc| v.clone().downcast::<T>().ok().map(|t| t as Arc<dyn OnRender>)));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_report_mismatch_and_range() {
        let args = Args::new("demo".into(), vec![Arc::new(String::from("hi")) as AnyArc, Arc::new(2.5f64)]);
        assert_eq!(args.string(0).unwrap(), "hi");
        assert_eq!(args.number(1).unwrap(), 2.5);
        assert!(matches!(args.boolean(1), Err(DiError::TypeMismatch { position: 1, .. })));
        assert!(matches!(args.get_any(2), Err(DiError::Misuse(_))));
    }

    #[test]
    fn later_marker_calls_replace_earlier_ones() {
        struct Thing;
        let container = Container::new();
        let ty = container
            .register::<Thing>("demo/Thing")
            .load_order(3)
            .load_order(5)
            .implements(["A"])
            .implements(["B", "A"])
            .finish()
            .unwrap();
        let meta = container.metadata();
        assert_eq!(meta.get_own(ty, keys::LOAD_ORDER, &Property::Type), Some(MetaValue::Int(5)));
        assert!(meta.implements(ty, "A") && meta.implements(ty, "B"));
    }

    #[test]
    fn rejected_parent_leaves_identifier_free() {
        struct Base;
        struct Other;
        struct Thing;
        let container = Container::new();
        let meta = container.metadata();
        meta.set_parent(TypeKey::of::<Thing>(), TypeKey::of::<Base>()).unwrap();

        let err = container.register::<Thing>("demo/Thing").parent::<Other>().finish().unwrap_err();
        assert!(matches!(err, DiError::Misuse(_)));
        assert!(meta.type_of("demo/Thing").is_none());

        let ty = container
            .register::<Thing>("demo/Thing")
            .parent::<Base>()
            .constructor(|_| Ok(Thing))
            .finish()
            .unwrap();
        assert_eq!(meta.type_of("demo/Thing"), Some(ty));
        assert!(container.resolve::<Thing>().is_ok());
    }

    #[test]
    fn taken_identifier_links_nothing() {
        struct Base;
        struct Owner;
        struct Thing;
        let container = Container::new();
        container.register::<Owner>("demo/Taken").finish().unwrap();

        let err = container
            .register::<Thing>("demo/Taken")
            .parent::<Base>()
            .load_order(4)
            .finish()
            .unwrap_err();
        assert!(matches!(err, DiError::RegistrationConflict { .. }));
        let ty = TypeKey::of::<Thing>();
        let meta = container.metadata();
        assert_eq!(meta.parent_of(ty), None);
        assert!(!meta.has_own(ty, keys::LOAD_ORDER, &Property::Type));

        container.register::<Thing>("demo/Free").parent::<Base>().finish().unwrap();
        assert_eq!(meta.parent_of(ty), Some(TypeKey::of::<Base>()));
    }

    #[test]
    fn identifier_through_metadata_is_validated_up_front() {
        struct Thing;
        let container = Container::new();
        let err = container
            .register::<Thing>("demo/Thing")
            .metadata(keys::IDENTIFIER, "demo/Other")
            .finish()
            .unwrap_err();
        assert!(matches!(err, DiError::Misuse(_)));
        assert!(container.metadata().id_of(TypeKey::of::<Thing>()).is_none());

        let ty = container.register_type::<Thing>().metadata(keys::IDENTIFIER, "demo/Thing").finish().unwrap();
        assert_eq!(container.metadata().id_of(ty).as_deref(), Some("demo/Thing"));
    }
}
