//! # Resource Instances
//!
//! A resource instance is a live object of a registered class: an identity
//! (`name`, `id`), a field [`Cache`] and the connection [`Scope`] it was
//! created under. Behavior is supplied by implementing the [`Resource`]
//! capability trait, one concrete type per class, and binding a factory for
//! it in the [`Registry`](crate::Registry).
//!
//! ## The capability contract
//!
//! | Method | Called | Returns |
//! |--------|--------|---------|
//! | [`Resource::register`] | once per field, on first demand | wiring errors |
//! | [`Resource::compute`] | whenever inputs may have changed | [`Computation`] |
//! | [`Resource::validate`] | once, at creation | validation errors |
//! | [`Resource::field`] | by consumers | the cached [`FieldState`] |
//!
//! `compute` never blocks waiting for inputs. If an input has not arrived it
//! returns [`Computation::NotReady`] and the runtime calls it again once the
//! input settles. The [`ready!`](crate::ready) macro makes that early return
//! a one-liner:
//!
//! ```rust,ignore
//! fn compute(&self, field: &str, _rt: &Runtime) -> Computation {
//!     match field {
//!         "size" => {
//!             let content = ready!(self.field("content"));
//!             Computation::Ready(Value::Int(content.as_str().map_or(0, str::len) as i64))
//!         }
//!         _ => Computation::Failed(FrameworkError::computation("unknown field")),
//!     }
//! }
//! ```

use crate::asset::{Asset, ConnectionHandle, Scope};
use crate::cache::{Cache, CacheEntry, FieldState};
use crate::error::{FrameworkError, Result};
use crate::registry::{FieldDef, ResourceClass};
use crate::runtime::Runtime;
use crate::value::{Args, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Shared handle to a live resource instance. Identity of the `Arc` is the
/// identity of the instance.
pub type ResourceRef = Arc<dyn Resource>;

/// `(name, id)` identity of an instance.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId {
    pub name: String,
    pub id: String,
}

impl ResourceId {
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
        }
    }

    /// Key of the instance in the runtime's instance map.
    pub fn uid(&self) -> String {
        format!("{}\0{}", self.name, self.id)
    }

    /// Field identity used for observer subscriptions.
    pub fn field_uid(&self, field: &str) -> String {
        format!("{}\0{}\0{}", self.name, self.id, field)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.id.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{} id={}", self.name, self.id)
        }
    }
}

/// State every resource carries. Embedded by value in resource structs and
/// exposed through [`Resource::core`].
#[derive(Debug)]
pub struct ResourceCore {
    id: ResourceId,
    cache: Cache,
    scope: Arc<Scope>,
}

impl ResourceCore {
    /// Usually called via [`Runtime::new_resource`].
    pub fn new(name: impl Into<String>, scope: Arc<Scope>) -> Self {
        Self {
            id: ResourceId::new(name, ""),
            cache: Cache::new(),
            scope,
        }
    }

    pub fn name(&self) -> &str {
        &self.id.name
    }

    pub fn id(&self) -> &str {
        &self.id.id
    }

    pub fn resource_id(&self) -> &ResourceId {
        &self.id
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id.id = id.into();
    }

    pub fn uid(&self) -> String {
        self.id.uid()
    }

    pub fn field_uid(&self, field: &str) -> String {
        self.id.field_uid(field)
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn scope(&self) -> &Arc<Scope> {
        &self.scope
    }

    pub fn asset(&self) -> &Asset {
        &self.scope.asset
    }

    pub fn connection(&self) -> &Arc<ConnectionHandle> {
        &self.scope.handle
    }

    /// Stores keyword arguments as settled static fields.
    pub fn init_fields(&self, args: Args) {
        for (field, value) in args {
            self.cache.store(field, CacheEntry::value(value));
        }
    }

    pub fn read(&self, field: &str) -> FieldState {
        self.cache.read(field)
    }

    /// Fails with `Validation` unless every mandatory field of `class` holds
    /// a value.
    pub(crate) fn check_mandatory(&self, class: &ResourceClass) -> Result<()> {
        let missing: Vec<&str> = class
            .fields
            .values()
            .filter(|f| f.mandatory)
            .filter(|f| !matches!(self.cache.read(&f.name), FieldState::Ready(_)))
            .map(|f| f.name.as_str())
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        Err(FrameworkError::Validation {
            resource: self.id.name.clone(),
            message: format!("missing mandatory fields: {}", missing.join(", ")),
        })
    }
}

/// The outcome of one attempt at computing a field.
#[derive(Clone, Debug, PartialEq)]
pub enum Computation {
    Ready(Value),
    /// An input has not arrived yet. Not a failure.
    NotReady,
    Failed(FrameworkError),
}

impl Computation {
    pub fn ready(value: impl Into<Value>) -> Self {
        Computation::Ready(value.into())
    }
}

impl From<Result<Value>> for Computation {
    fn from(result: Result<Value>) -> Self {
        match result {
            Ok(v) => Computation::Ready(v),
            Err(e) => Computation::Failed(e),
        }
    }
}

/// Unwraps a [`FieldState`] inside `Resource::compute`, returning early with
/// `NotReady` or `Failed` when the input is not a value.
#[macro_export]
macro_rules! ready {
    ($state:expr) => {
        match $crate::FieldState::into_input($state) {
            ::std::result::Result::Ok(value) => value,
            ::std::result::Result::Err(pending) => return pending,
        }
    };
}

/// Capability contract of a resource class implementation.
pub trait Resource: Send + Sync + 'static {
    fn core(&self) -> &ResourceCore;

    fn core_mut(&mut self) -> &mut ResourceCore;

    /// Wires the upstream dependencies of `field`. Called exactly once per
    /// field, the first time it is demanded.
    fn register(&self, _field: &str, _deps: &Dependencies<'_>) -> Result<()> {
        Ok(())
    }

    /// Attempts to produce `field` right now.
    fn compute(&self, field: &str, runtime: &Runtime) -> Computation;

    /// Called once when the instance is created. An error aborts creation.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// The cached state of `field`.
    fn field(&self, name: &str) -> FieldState {
        self.core().read(name)
    }
}

impl fmt::Debug for dyn Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.core().resource_id())
    }
}

/// Handed to [`Resource::register`]: declares which fields `field` is
/// computed from.
pub struct Dependencies<'a> {
    runtime: &'a Runtime,
    resource: &'a ResourceRef,
    field: &'a str,
}

impl<'a> Dependencies<'a> {
    pub(crate) fn new(runtime: &'a Runtime, resource: &'a ResourceRef, field: &'a str) -> Self {
        Self {
            runtime,
            resource,
            field,
        }
    }

    /// Recompute this field whenever `source.source_field` settles.
    pub fn watch(&self, source: &ResourceRef, source_field: &str) -> Result<()> {
        self.runtime
            .watch_and_compute(source, source_field, self.resource, self.field)
    }

    /// Recompute this field whenever another field of the same instance
    /// settles.
    pub fn watch_own(&self, source_field: &str) -> Result<()> {
        self.watch(self.resource, source_field)
    }

    pub fn runtime(&self) -> &Runtime {
        self.runtime
    }

    pub fn resource(&self) -> &ResourceRef {
        self.resource
    }

    pub fn field(&self) -> &str {
        self.field
    }
}

// =============================================================================
// MOCK RESOURCES
// =============================================================================

/// Stand-in for a declared class that has no factory. Every field reads
/// back the static default of its declared type.
pub struct MockResource {
    core: ResourceCore,
    fields: BTreeMap<String, FieldDef>,
}

impl MockResource {
    pub fn new(runtime: &Runtime, class: &ResourceClass) -> Self {
        Self {
            core: runtime.new_resource(&class.id),
            fields: class.fields.clone(),
        }
    }
}

impl Resource for MockResource {
    fn core(&self) -> &ResourceCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ResourceCore {
        &mut self.core
    }

    fn compute(&self, field: &str, _runtime: &Runtime) -> Computation {
        match self.fields.get(field) {
            Some(def) => Computation::Ready(def.field_type.zero_value()),
            None => Computation::Failed(FrameworkError::FieldNotFound {
                resource: self.core.name().to_owned(),
                field: field.to_owned(),
            }),
        }
    }
}
