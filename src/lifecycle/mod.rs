//! # System Lifecycle & Orchestration
//!
//! This module wires the sample resource pack to a runtime and manages that
//! runtime from startup to shutdown.
//!
//! ## The InspectionSystem Pattern
//!
//! Individual resources are simple; the work is in assembling a registry,
//! a runtime bound to an asset, and the connections behind it. The
//! [`InspectionSystem`] is the conductor:
//!
//! ```rust,ignore
//! let system = InspectionSystem::new(config, asset, connection, provider)?;
//!
//! // 1. Ask for a field: creates the resource, watches the field, waits for the value
//! let size = system.evaluate("file", &kwargs!["path" => "/etc/hostname"], "size")?;
//!
//! // 2. Ask the same question of many assets at once
//! let results = system.scan_assets(assets, "os", "hostname").await;
//!
//! // 3. Drop every subscription and close every connection handle
//! system.shutdown();
//! ```
//!
//! ## Queries are watchers
//!
//! Each [`InspectionSystem::evaluate`] call subscribes a fresh watcher
//! (`query-1`, `query-2`, ...) to the requested field. Computation is
//! synchronous, so by the time the subscription returns the value has
//! either been delivered or is waiting on an input nobody will provide; the
//! latter is reported as [`FrameworkError::Unresolved`](resource_framework::FrameworkError::Unresolved).
//!
//! ## Scans
//!
//! [`InspectionSystem::scan_assets`] gives every asset its own runtime and
//! connection (opened through the [`ConnectionProvider`](resource_framework::ConnectionProvider))
//! and runs them on the worker pool. Assets share the registry and nothing
//! else, so one failing asset never affects another.
//!
//! ## Graceful Shutdown
//!
//! [`InspectionSystem::shutdown`] unregisters every query watcher, then
//! closes every connection handle the runtime opened, each exactly once.

pub mod inspection_system;

pub use inspection_system::*;
