//! # Runtime
//!
//! The runtime creates and deduplicates resource instances and drives the
//! reactive protocol that computes their fields.
//!
//! ## Protocol
//!
//! - [`Runtime::watch_and_update`]: a consumer subscribes to a field and
//!   receives its value (or error) exactly once, as soon as it settles.
//! - [`Runtime::watch_and_compute`]: used inside [`Resource::register`] to
//!   declare that one field is computed from another.
//! - [`Runtime::trigger`]: demands a field. The first caller to claim it
//!   computes it; everyone else waits for the broadcast.
//! - [`Runtime::unregister`]: drops every subscription of a watcher.
//!
//! All of this runs synchronously on the caller's thread. A field that
//! settles broadcasts to its watchers, whose callbacks compute dependent
//! fields, which settle and broadcast in turn, all on one call stack. The
//! stack therefore grows with the length of a dependency chain.
//!
//! ## Precondition on `trigger`
//!
//! A caller that triggers a field and gets [`Readiness::NotReady`] is only
//! ever told about the value through a subscription. Triggering a field
//! nobody watches is therefore reported as
//! [`FrameworkError::UnobservedTrigger`] (or a warning, when
//! [`RuntimeConfig::strict_trigger`] is off).
//!
//! ## Scopes
//!
//! A runtime is bound to one asset and one connection handle. Scoped
//! children created through [`Runtime::with_asset_context`] share the
//! registry, the instances and the observer graph, and differ only in the
//! asset context new resources are created under.

use crate::asset::{Asset, Connection, ConnectionHandle, Scope};
use crate::cache::{CacheEntry, Claim, Park};
use crate::config::RuntimeConfig;
use crate::error::{FrameworkError, Result};
use crate::observers::{printable, Callback, Observers};
use crate::registry::{Registry, ResourceClass};
use crate::resource::{Computation, Dependencies, MockResource, Resource, ResourceCore, ResourceRef};
use crate::value::{args_from_pairs, Value};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, trace, warn};

/// Whether a demanded field has a value yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    NotReady,
}

/// Outcome of one claim-and-compute attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Step {
    /// This call settled the field and broadcast it.
    Computed,
    /// The field had already settled.
    Settled,
    /// Another caller holds the claim.
    InFlight,
    /// Inputs are missing; the field waits for a broadcast.
    NotReady,
}

#[derive(Clone)]
pub struct Runtime {
    registry: Arc<Registry>,
    instances: Arc<DashMap<String, ResourceRef>>,
    observers: Arc<Observers>,
    scope: Arc<Scope>,
    scopes: Arc<Mutex<Vec<Arc<Scope>>>>,
    config: Arc<RuntimeConfig>,
}

/// A runtime held by observer callbacks. Does not keep the observer graph
/// alive, so callbacks stored in the graph do not form a cycle with it.
#[derive(Clone)]
struct WeakRuntime {
    registry: Arc<Registry>,
    instances: Arc<DashMap<String, ResourceRef>>,
    observers: Weak<Observers>,
    scope: Arc<Scope>,
    scopes: Arc<Mutex<Vec<Arc<Scope>>>>,
    config: Arc<RuntimeConfig>,
}

impl WeakRuntime {
    fn upgrade(&self) -> Option<Runtime> {
        Some(Runtime {
            registry: self.registry.clone(),
            instances: self.instances.clone(),
            observers: self.observers.upgrade()?,
            scope: self.scope.clone(),
            scopes: self.scopes.clone(),
            config: self.config.clone(),
        })
    }
}

/// Resets a claimed field if `compute` unwinds.
struct ClaimGuard<'a> {
    resource: &'a ResourceRef,
    field: &'a str,
    armed: bool,
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.resource.core().cache().release(self.field);
        }
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("asset", &self.scope.asset.name)
            .field("handle", &self.scope.handle.id())
            .field("instances", &self.instances.len())
            .finish()
    }
}

impl Runtime {
    /// A runtime for `asset`, reached over `connection`.
    pub fn new(registry: Arc<Registry>, asset: Asset, connection: Arc<dyn Connection>) -> Self {
        let scope = Scope::new(asset, ConnectionHandle::open(connection));
        Self {
            registry,
            instances: Arc::new(DashMap::new()),
            observers: Arc::new(Observers::new()),
            scopes: Arc::new(Mutex::new(vec![scope.clone()])),
            scope,
            config: Arc::new(RuntimeConfig::default()),
        }
    }

    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn observers(&self) -> &Arc<Observers> {
        &self.observers
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
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

    /// The core of a new resource of class `name`, bound to this runtime's
    /// asset context. Called from factories.
    pub fn new_resource(&self, name: &str) -> ResourceCore {
        ResourceCore::new(name, self.scope.clone())
    }

    // =========================================================================
    // INSTANCES
    // =========================================================================

    /// Creates (or finds) an instance of `name` from flat keyword arguments.
    pub fn create_resource(&self, name: &str, args: &[Value]) -> Result<ResourceRef> {
        self.create_resource_with_id(name, "", args)
    }

    /// Like [`create_resource`](Self::create_resource), forcing the instance
    /// id to `id` when it is not empty.
    ///
    /// The factory may return a shell whose only purpose is to carry the id
    /// of an existing instance; in that case the existing instance is
    /// returned and the shell is dropped. New instances are validated and
    /// checked for mandatory fields before they are stored.
    pub fn create_resource_with_id(&self, name: &str, id: &str, args: &[Value]) -> Result<ResourceRef> {
        let class = self.registry.resolve(name)?;
        let args = args_from_pairs(args)?;

        let Some(factory) = class.factory.clone() else {
            if !args.is_empty() {
                return Err(FrameworkError::MockArguments(name.to_owned()));
            }
            return Ok(self.create_mock(&class, id));
        };

        let mut resource = factory(self, args).map_err(|e| FrameworkError::Factory {
            resource: name.to_owned(),
            message: e.to_string(),
        })?;
        if !id.is_empty() {
            resource.core_mut().set_id(id);
        }
        let key = resource.core().uid();
        trace!(resource = %resource.core().name(), id = %resource.core().id(), "Created resource");

        if let Some(existing) = self.instances.get(&key) {
            return Ok(existing.value().clone());
        }

        resource.validate().map_err(|e| match e {
            invalid @ FrameworkError::Validation { .. } => invalid,
            other => FrameworkError::Validation {
                resource: name.to_owned(),
                message: other.to_string(),
            },
        })?;
        resource.core().check_mandatory(&class)?;

        let resource: ResourceRef = Arc::from(resource);
        Ok(self.instances.entry(key).or_insert(resource).value().clone())
    }

    fn create_mock(&self, class: &ResourceClass, id: &str) -> ResourceRef {
        let mut mock = MockResource::new(self, class);
        if !id.is_empty() {
            mock.core_mut().set_id(id);
        }
        debug!(resource = %class.id, "Created mock resource");
        let key = mock.core().uid();
        self.instances
            .entry(key)
            .or_insert_with(|| Arc::new(mock))
            .value()
            .clone()
    }

    /// Creates `name` under the asset context `asset`/`connection`. Without
    /// a connection the current one is reused.
    pub fn create_resource_with_asset_context(
        &self,
        name: &str,
        asset: &Asset,
        connection: Option<Arc<dyn Connection>>,
        args: &[Value],
    ) -> Result<ResourceRef> {
        self.with_asset_context(asset, connection).create_resource(name, args)
    }

    /// A runtime scoped to `asset` over `connection` (default: the current
    /// connection). The same asset over the same connection always maps to
    /// the same scope and connection handle; anything else opens a new
    /// handle that is closed independently. The connection itself closes
    /// with the last handle over it.
    pub fn with_asset_context(&self, asset: &Asset, connection: Option<Arc<dyn Connection>>) -> Runtime {
        let connection = connection.unwrap_or_else(|| self.scope.handle.connection().clone());
        if self.scope.matches(asset, &connection) {
            return self.clone();
        }

        let mut scopes = self.scopes.lock();
        let scope = match scopes.iter().find(|s| s.matches(asset, &connection)) {
            Some(scope) => scope.clone(),
            None => {
                let sibling = scopes
                    .iter()
                    .filter(|s| s.handle.wraps(&connection))
                    .find_map(|s| s.handle.share().ok());
                let handle = match sibling {
                    Some(handle) => handle,
                    None => ConnectionHandle::open(connection),
                };
                let scope = Scope::new(asset.clone(), handle);
                info!(asset = %asset.name, handle = scope.handle.id(), "Opened asset scope");
                scopes.push(scope.clone());
                scope
            }
        };
        drop(scopes);

        Runtime {
            scope,
            ..self.clone()
        }
    }

    /// The runtime `resource` computes in: this one, scoped to the
    /// resource's asset context.
    fn bound(&self, resource: &ResourceRef) -> Runtime {
        let scope = resource.core().scope();
        if Arc::ptr_eq(scope, &self.scope) {
            return self.clone();
        }
        Runtime {
            scope: scope.clone(),
            ..self.clone()
        }
    }

    fn downgrade(&self) -> WeakRuntime {
        WeakRuntime {
            registry: self.registry.clone(),
            instances: self.instances.clone(),
            observers: Arc::downgrade(&self.observers),
            scope: self.scope.clone(),
            scopes: self.scopes.clone(),
            config: self.config.clone(),
        }
    }

    pub fn get_resource(&self, name: &str, id: &str) -> Result<ResourceRef> {
        let class = self
            .registry
            .canonical(name)
            .map(|c| c.id.as_str())
            .unwrap_or(name);
        let key = crate::resource::ResourceId::new(class, id).uid();
        self.instances
            .get(&key)
            .map(|r| r.value().clone())
            .ok_or_else(|| FrameworkError::InstanceNotFound {
                name: name.to_owned(),
                id: id.to_owned(),
            })
    }

    /// Stores `resource` under its identity unless an instance is already
    /// cached there. Returns the resident instance.
    pub fn set_resource(&self, resource: ResourceRef) -> ResourceRef {
        let key = resource.core().uid();
        self.instances.entry(key).or_insert(resource).value().clone()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    // =========================================================================
    // REACTIVE PROTOCOL
    // =========================================================================

    /// Subscribes `watcher` to `field` of `resource`. `callback` receives the
    /// field's value or error once, as soon as it settles (immediately if it
    /// already has).
    ///
    /// Subscribing the same watcher twice is a no-op.
    pub fn watch_and_update<F>(&self, resource: &ResourceRef, field: &str, watcher: &str, callback: F) -> Result<()>
    where
        F: Fn(Result<Value>) + Send + Sync + 'static,
    {
        let core = resource.core();
        self.registry.field(core.name(), field)?;
        let uid = core.field_uid(field);

        let process: Callback = {
            let resource = resource.clone();
            let field = field.to_owned();
            let delivered = AtomicBool::new(false);
            Arc::new(move || {
                let Some(entry) = resource.core().cache().load(&field) else {
                    return;
                };
                if !delivered.swap(true, Ordering::SeqCst) {
                    callback(entry.to_result());
                }
            })
        };

        let watch = self.observers.watch(&uid, watcher, process.clone());
        trace!(
            resource = %core.name(), id = %core.id(), field, watcher,
            initial = watch.initial, exists = watch.exists,
            "Watch and update"
        );
        if watch.exists {
            return Ok(());
        }

        // fields with injected content skip registration and are delivered
        // right away
        if watch.initial && !core.cache().is_settled(field) {
            let rt = self.bound(resource);
            if let Err(e) = resource.register(field, &Dependencies::new(&rt, resource, field)) {
                rt.settle(resource, field, Err(e.clone()));
                return Err(e);
            }
            rt.claim_and_compute(resource, field);
        }

        if core.cache().is_settled(field) {
            process();
        }
        Ok(())
    }

    /// Recomputes `dst.dst_field` whenever `src.src_field` settles. The
    /// first subscription to `src_field` also registers and computes it.
    pub fn watch_and_compute(
        &self,
        src: &ResourceRef,
        src_field: &str,
        dst: &ResourceRef,
        dst_field: &str,
    ) -> Result<()> {
        let src_core = src.core();
        self.registry.field(src_core.name(), src_field)?;
        let src_uid = src_core.field_uid(src_field);
        let watcher = dst.core().field_uid(dst_field);

        let callback: Callback = {
            let rt = self.bound(dst).downgrade();
            let dst = dst.clone();
            let dst_field = dst_field.to_owned();
            Arc::new(move || {
                if let Some(rt) = rt.upgrade() {
                    rt.claim_and_compute(&dst, &dst_field);
                }
            })
        };

        let watch = self.observers.watch(&src_uid, &watcher, callback);
        trace!(
            src = %printable(&src_uid), dst = %printable(&watcher),
            initial = watch.initial, exists = watch.exists,
            "Watch and compute"
        );
        if watch.exists {
            return Ok(());
        }

        if watch.initial && !src_core.cache().is_settled(src_field) {
            let rt = self.bound(src);
            if let Err(e) = src.register(src_field, &Dependencies::new(&rt, src, src_field)) {
                rt.settle(src, src_field, Err(e.clone()));
                return Err(e);
            }
            rt.claim_and_compute(src, src_field);
        }
        Ok(())
    }

    /// Demands `field` of `resource`.
    ///
    /// A settled field is broadcast again and reported ready. A field being
    /// computed elsewhere is reported not ready. Otherwise this call claims
    /// and computes it.
    pub fn trigger(&self, resource: &ResourceRef, field: &str) -> Result<Readiness> {
        if field.is_empty() {
            return Err(FrameworkError::EmptyField);
        }
        let core = resource.core();
        let uid = core.field_uid(field);
        trace!(resource = %core.name(), id = %core.id(), field, "Trigger");

        match self.bound(resource).claim_and_compute(resource, field) {
            Step::Computed => Ok(Readiness::Ready),
            Step::Settled => {
                self.observers.trigger(&uid);
                Ok(Readiness::Ready)
            }
            Step::InFlight => Ok(Readiness::NotReady),
            Step::NotReady if self.observers.is_watched(&uid) => Ok(Readiness::NotReady),
            Step::NotReady if self.config.strict_trigger => Err(FrameworkError::UnobservedTrigger {
                resource: core.resource_id().to_string(),
                field: field.to_owned(),
            }),
            Step::NotReady => {
                warn!(resource = %core.name(), id = %core.id(), field, "Triggered field is not ready and unobserved");
                Ok(Readiness::NotReady)
            }
        }
    }

    /// Settles `field` from outside the compute path (data pushed by a
    /// watcher or a stream) and broadcasts it. A field that already settled
    /// keeps its value; returns whether `result` was stored.
    pub fn publish(&self, resource: &ResourceRef, field: &str, result: Result<Value>) -> Result<bool> {
        self.registry.field(resource.core().name(), field)?;
        Ok(self.settle(resource, field, result) == Step::Computed)
    }

    /// Removes every subscription of `watcher`. Returns how many there were.
    pub fn unregister(&self, watcher: &str) -> usize {
        trace!(watcher, "Unregister");
        self.observers.unwatch_all(watcher)
    }

    /// Closes every connection handle opened by this runtime and its scoped
    /// children. Returns how many were closed by this call.
    pub fn close(&self) -> usize {
        let scopes = self.scopes.lock().clone();
        let closed = scopes.iter().filter(|s| s.handle.close()).count();
        info!(closed, scopes = scopes.len(), "Runtime closed");
        closed
    }

    fn claim_and_compute(&self, resource: &ResourceRef, field: &str) -> Step {
        let cache = resource.core().cache();
        match cache.claim(field) {
            Claim::Settled(_) => return Step::Settled,
            Claim::InFlight => return Step::InFlight,
            Claim::Acquired => {}
        }

        let mut guard = ClaimGuard {
            resource,
            field,
            armed: true,
        };
        loop {
            let result = match resource.compute(field, self) {
                Computation::Ready(value) => Ok(value),
                Computation::Failed(e) => Err(e),
                Computation::NotReady => match cache.park(field) {
                    Park::Retry => continue,
                    Park::Settled => {
                        guard.armed = false;
                        return Step::Settled;
                    }
                    Park::Parked => {
                        guard.armed = false;
                        trace!(resource = %resource.core().name(), field, "Not ready");
                        return Step::NotReady;
                    }
                },
            };
            guard.armed = false;
            return self.settle(resource, field, result);
        }
    }

    fn settle(&self, resource: &ResourceRef, field: &str, result: Result<Value>) -> Step {
        let core = resource.core();
        if !core.cache().settle(field, CacheEntry::from_result(result)) {
            return Step::Settled;
        }
        trace!(resource = %core.name(), id = %core.id(), field, "Settled");
        self.observers.trigger(&core.field_uid(field));
        Step::Computed
    }
}
