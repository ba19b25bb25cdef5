//! Inheritance-aware metadata store and identity registry.
//!
//! Every registrable type owns a bag of key/value annotations, either on the
//! type itself or on a named member. Lookups that miss on a type continue up
//! the single-parent chain recorded with [`MetadataStore::set_parent`] unless
//! the caller asks for own metadata only.
//!
//! The store also keeps the bidirectional identifier mapping: defining the
//! [`keys::IDENTIFIER`] key on a type registers it, and every identifier maps
//! to exactly one type for the lifetime of the store.

use std::collections::{BTreeMap, HashMap};

use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;
#[cfg(feature = "config")]
use serde::{Deserialize, Serialize};

use crate::{DiError, DiResult, TypeKey};

/// Conventional metadata keys written by the registration surface.
pub mod keys {
    /// Globally unique identifier of a type. Defining it registers the identity.
    pub const IDENTIFIER: &str = "identifier";
    /// Role a type is a singleton for (`"server"` or `"client"`).
    pub const SINGLETON: &str = "ignite:singleton";
    /// Explicit ignition load order, defaults to 1.
    pub const LOAD_ORDER: &str = "ignite:loadOrder";
    /// Constructor dependency identifiers, in parameter order.
    pub const PARAMETERS: &str = "ignite:parameters";
    /// Marker interface identifiers implemented by a type.
    pub const IMPLEMENTS: &str = "ignite:implements";
    /// Optional singletons are only ignited when explicitly included.
    pub const OPTIONAL: &str = "ignite:optional";
    /// Types shipped by an external package, ignited only after registration.
    pub const EXTERNAL: &str = "ignite:external";
}

/// Arbitrary metadata value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(untagged))]
pub enum MetaValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<MetaValue>),
    Map(BTreeMap<String, MetaValue>),
}

impl MetaValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MetaValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetaValue::Float(f) => Some(*f),
            MetaValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetaValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[MetaValue]> {
        match self {
            MetaValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// String items of a list value; non-string items are skipped.
    pub fn string_items(&self) -> Vec<String> {
        self.as_list()
            .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_owned)).collect())
            .unwrap_or_default()
    }
}

impl From<bool> for MetaValue {
    fn from(v: bool) -> Self {
        MetaValue::Bool(v)
    }
}

impl From<i64> for MetaValue {
    fn from(v: i64) -> Self {
        MetaValue::Int(v)
    }
}

impl From<i32> for MetaValue {
    fn from(v: i32) -> Self {
        MetaValue::Int(v as i64)
    }
}

impl From<f64> for MetaValue {
    fn from(v: f64) -> Self {
        MetaValue::Float(v)
    }
}

impl From<&str> for MetaValue {
    fn from(v: &str) -> Self {
        MetaValue::Str(v.to_owned())
    }
}

impl From<String> for MetaValue {
    fn from(v: String) -> Self {
        MetaValue::Str(v)
    }
}

impl<T: Into<MetaValue>> From<Vec<T>> for MetaValue {
    fn from(v: Vec<T>) -> Self {
        MetaValue::List(v.into_iter().map(Into::into).collect())
    }
}

/// Own-property selector: the type itself or one of its members.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Property {
    Type,
    Member(String),
}

impl Property {
    pub fn member(name: impl Into<String>) -> Self {
        Property::Member(name.into())
    }
}

impl Default for Property {
    fn default() -> Self {
        Property::Type
    }
}

#[derive(Default)]
struct TypeRecord {
    parent: Option<TypeKey>,
    bags: IndexMap<Property, IndexMap<String, MetaValue>>,
}

#[derive(Default)]
struct StoreInner {
    records: HashMap<TypeKey, TypeRecord>,
    // Registration order is the canonical enumeration order for ignition.
    ids: IndexMap<String, TypeKey>,
    type_ids: HashMap<TypeKey, String>,
}

impl StoreInner {
    /// Walks `ty` and its ancestors, nearest first.
    fn chain(&self, ty: TypeKey) -> Vec<TypeKey> {
        let mut chain = vec![ty];
        let mut current = self.records.get(&ty).and_then(|r| r.parent);
        while let Some(parent) = current {
            chain.push(parent);
            current = self.records.get(&parent).and_then(|r| r.parent);
        }
        chain
    }

    fn check_parent(&self, child: TypeKey, parent: TypeKey) -> DiResult<()> {
        if self.chain(parent).contains(&child) {
            return Err(DiError::misuse(format!(
                "{} cannot inherit from {}: inheritance would be cyclic",
                child.name(),
                parent.name()
            )));
        }
        match self.records.get(&child).and_then(|r| r.parent) {
            Some(existing) if existing != parent => Err(DiError::misuse(format!(
                "{} already inherits from {}",
                child.name(),
                existing.name()
            ))),
            _ => Ok(()),
        }
    }

    fn check_identifier(&self, ty: TypeKey, identifier: &str) -> DiResult<()> {
        if let Some(existing) = self.type_ids.get(&ty) {
            return Err(DiError::RegistrationConflict {
                identifier: identifier.to_owned(),
                reason: format!("{} already has identifier '{}'", ty.name(), existing),
            });
        }
        if let Some(owner) = self.ids.get(identifier) {
            return Err(DiError::RegistrationConflict {
                identifier: identifier.to_owned(),
                reason: format!("identifier already assigned to {}", owner.name()),
            });
        }
        Ok(())
    }

    fn own(&self, ty: TypeKey, key: &str, property: &Property) -> Option<&MetaValue> {
        self.records.get(&ty)?.bags.get(property)?.get(key)
    }
}

/// Inheritance-aware key/value annotation store keyed by (type, property).
///
/// # Examples
///
/// ```rust
/// use ignite_di::{MetadataStore, Property, key_of_type};
///
/// struct Base;
/// struct Derived;
///
/// let store = MetadataStore::new();
/// let base = key_of_type::<Base>();
/// let derived = key_of_type::<Derived>();
/// store.set_parent(derived, base).unwrap();
/// store.define(base, "color", "red".into(), Property::Type).unwrap();
///
/// assert_eq!(store.get(derived, "color", &Property::Type).unwrap().as_str(), Some("red"));
/// assert!(store.get_own(derived, "color", &Property::Type).is_none());
/// ```
#[derive(Default)]
pub struct MetadataStore {
    inner: RwLock<StoreInner>,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key`.
    ///
    /// Defining [`keys::IDENTIFIER`] on the type itself also registers the
    /// identity record and fails with `RegistrationConflict` if the type already
    /// has an identifier or the identifier belongs to another type. Nothing is
    /// stored when the registration fails.
    pub fn define(&self, ty: TypeKey, key: &str, value: MetaValue, property: Property) -> DiResult<()> {
        let mut inner = self.inner.write();
        if key == keys::IDENTIFIER && property == Property::Type {
            let identifier = value.as_str().ok_or_else(|| DiError::RegistrationConflict {
                identifier: format!("{:?}", value),
                reason: format!("identifier of {} must be a string", ty.name()),
            })?;
            inner.check_identifier(ty, identifier)?;
            inner.ids.insert(identifier.to_owned(), ty);
            inner.type_ids.insert(ty, identifier.to_owned());
        }
        inner
            .records
            .entry(ty)
            .or_default()
            .bags
            .entry(property)
            .or_default()
            .insert(key.to_owned(), value);
        Ok(())
    }

    /// Stores several values on the same property. Stops at the first failure.
    pub fn define_batch<I, K>(&self, ty: TypeKey, entries: I, property: Property) -> DiResult<()>
    where
        I: IntoIterator<Item = (K, MetaValue)>,
        K: AsRef<str>,
    {
        for (key, value) in entries {
            self.define(ty, key.as_ref(), value, property.clone())?;
        }
        Ok(())
    }

    /// Records the single parent of `child`. Rejects links that would make the
    /// chain cyclic and re-parenting to a different type.
    pub fn set_parent(&self, child: TypeKey, parent: TypeKey) -> DiResult<()> {
        let mut inner = self.inner.write();
        inner.check_parent(child, parent)?;
        inner.records.entry(child).or_default().parent = Some(parent);
        inner.records.entry(parent).or_default();
        Ok(())
    }

    /// Fails like [`MetadataStore::define`] would for `identifier`, without
    /// storing anything.
    pub fn check_identifier(&self, ty: TypeKey, identifier: &str) -> DiResult<()> {
        self.inner.read().check_identifier(ty, identifier)
    }

    /// Fails like [`MetadataStore::set_parent`] would, without linking.
    pub fn check_parent(&self, child: TypeKey, parent: TypeKey) -> DiResult<()> {
        self.inner.read().check_parent(child, parent)
    }

    pub fn parent_of(&self, ty: TypeKey) -> Option<TypeKey> {
        self.inner.read().records.get(&ty).and_then(|r| r.parent)
    }

    /// `ty` followed by its ancestors, nearest first.
    pub fn ancestors(&self, ty: TypeKey) -> Vec<TypeKey> {
        self.inner.read().chain(ty)
    }

    /// Exact lookup without the inheritance walk.
    pub fn get_own(&self, ty: TypeKey, key: &str, property: &Property) -> Option<MetaValue> {
        self.inner.read().own(ty, key, property).cloned()
    }

    /// Lookup that continues to the parent on a miss.
    pub fn get(&self, ty: TypeKey, key: &str, property: &Property) -> Option<MetaValue> {
        let inner = self.inner.read();
        inner
            .chain(ty)
            .into_iter()
            .find_map(|t| inner.own(t, key, property).cloned())
    }

    /// One value per ancestor defining `key`, nearest first.
    pub fn get_all(&self, ty: TypeKey, key: &str, property: &Property) -> Vec<MetaValue> {
        let inner = self.inner.read();
        inner
            .chain(ty)
            .into_iter()
            .filter_map(|t| inner.own(t, key, property).cloned())
            .collect()
    }

    pub fn has_own(&self, ty: TypeKey, key: &str, property: &Property) -> bool {
        self.inner.read().own(ty, key, property).is_some()
    }

    pub fn has(&self, ty: TypeKey, key: &str, property: &Property) -> bool {
        let inner = self.inner.read();
        inner.chain(ty).into_iter().any(|t| inner.own(t, key, property).is_some())
    }

    pub fn keys_of_own(&self, ty: TypeKey, property: &Property) -> Vec<String> {
        let inner = self.inner.read();
        inner
            .records
            .get(&ty)
            .and_then(|r| r.bags.get(property))
            .map(|bag| bag.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Keys visible on `ty` through inheritance, nearest definition first.
    pub fn keys_of(&self, ty: TypeKey, property: &Property) -> Vec<String> {
        let inner = self.inner.read();
        let mut seen = IndexSet::new();
        for t in inner.chain(ty) {
            if let Some(bag) = inner.records.get(&t).and_then(|r| r.bags.get(property)) {
                seen.extend(bag.keys().cloned());
            }
        }
        seen.into_iter().collect()
    }

    /// Member names carrying metadata on `ty` itself.
    pub fn properties_of_own(&self, ty: TypeKey) -> Vec<String> {
        let inner = self.inner.read();
        inner
            .records
            .get(&ty)
            .map(|r| r.bags.keys().filter_map(member_name).collect())
            .unwrap_or_default()
    }

    /// Member names carrying metadata on `ty` or any ancestor.
    pub fn properties_of(&self, ty: TypeKey) -> Vec<String> {
        let inner = self.inner.read();
        let mut seen = IndexSet::new();
        for t in inner.chain(ty) {
            if let Some(record) = inner.records.get(&t) {
                seen.extend(record.bags.keys().filter_map(member_name));
            }
        }
        seen.into_iter().collect()
    }

    /// Whether `ty` or an ancestor lists `interface` in [`keys::IMPLEMENTS`].
    pub fn implements(&self, ty: TypeKey, interface: &str) -> bool {
        self.get_all(ty, keys::IMPLEMENTS, &Property::Type)
            .iter()
            .any(|list| list.string_items().iter().any(|id| id == interface))
    }

    // ----- Identity registry -----

    pub fn type_of(&self, identifier: &str) -> Option<TypeKey> {
        self.inner.read().ids.get(identifier).copied()
    }

    pub fn id_of(&self, ty: TypeKey) -> Option<String> {
        self.inner.read().type_ids.get(&ty).cloned()
    }

    /// Every identified type in registration order.
    pub fn identified(&self) -> Vec<(String, TypeKey)> {
        self.inner.read().ids.iter().map(|(id, ty)| (id.clone(), *ty)).collect()
    }

    /// Identifier of `ty`, falling back to its short type name.
    pub fn describe(&self, ty: TypeKey) -> String {
        self.id_of(ty).unwrap_or_else(|| ty.short_name().to_owned())
    }
}

fn member_name(property: &Property) -> Option<String> {
    match property {
        Property::Member(name) => Some(name.clone()),
        Property::Type => None,
    }
}
