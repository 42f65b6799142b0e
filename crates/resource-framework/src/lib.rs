//! # Resource Framework
//!
//! The resource computation runtime of an asset inspection engine. A query
//! asks for fields of *resources* (`file`, `os.packages`, `command`, ...);
//! this crate creates those resources, computes their fields on demand, and
//! pushes every field's value to whoever asked for it, as soon as it exists.
//!
//! ## Architecture Overview
//!
//! 1. **Schema Layer** ([`Registry`], [`SchemaDocument`]): the immutable
//!    classes: their fields, aliases, implicit parent chains and factories.
//! 2. **Instance Layer** ([`Resource`], [`ResourceCore`], [`Cache`]): live
//!    objects, each with an identity and a per-field cache.
//! 3. **Reactive Layer** ([`Runtime`], [`Observers`]): watch, compute,
//!    trigger and broadcast.
//!
//! ## Computing a field
//!
//! Fields are computed lazily and at most once. A field that depends on
//! another declares so in [`Resource::register`]; when the input settles the
//! dependent field is computed and its own watchers are notified in turn:
//!
//! ```text
//!   consumer ──watch_and_update──▶ file.size
//!                                    │ register: watch_own("content")
//!                                    ▼
//!                                  file.content ──compute──▶ connection.read_file
//!                                    │ settled → broadcast
//!                                    ▼
//!                                  file.size computed → broadcast → consumer callback
//! ```
//!
//! A computation whose inputs are missing returns
//! [`Computation::NotReady`]. That is a normal outcome, not an error; the
//! field is computed again once its inputs arrive.
//!
//! ## Modules
//!
//! - [`registry`] / [`schema`]: classes and the JSON schema document
//! - [`value`]: dynamically typed field values and declared field types
//! - [`cache`]: the per-instance field cache and its claim protocol
//! - [`observers`]: the field subscription graph
//! - [`resource`]: the resource capability trait and mock resources
//! - [`runtime`]: instance creation and the reactive protocol
//! - [`asset`]: assets, connections and connection handles
//! - [`pool`]: worker pool for scans across independent assets
//! - [`config`] / [`telemetry`]: configuration and logging setup
//! - [`mock`]: test doubles

pub mod asset;
pub mod cache;
pub mod config;
pub mod error;
pub mod mock;
pub mod observers;
pub mod pool;
pub mod registry;
pub mod resource;
pub mod runtime;
pub mod schema;
pub mod telemetry;
pub mod value;

pub use asset::{Asset, CommandOutput, Connection, ConnectionHandle, ConnectionProvider, Scope};
pub use cache::{Cache, CacheEntry, FieldState};
pub use config::RuntimeConfig;
pub use error::{FrameworkError, Result};
pub use observers::{Observers, Watch};
pub use pool::WorkerPool;
pub use registry::{Factory, FieldDef, Registry, ResourceClass};
pub use resource::{Computation, Dependencies, MockResource, Resource, ResourceCore, ResourceId, ResourceRef};
pub use runtime::{Readiness, Runtime};
pub use schema::{FieldInfo, ResourceInfo, SchemaDocument};
pub use value::{args_from_pairs, Args, FieldType, Value};
