//! # Inspect Recipe App Library
//!
//! The application layer on top of [`resource_framework`]: a sample resource
//! pack, a connection to the local host and the lifecycle orchestrator that
//! ties them to a runtime. Exposed as a library for integration testing.
//!
//! - [`resources`]: the sample pack (`asset`, `os`, `os.packages`, `package`, `file`, `command`)
//! - [`connection`]: [`LocalConnection`](connection::LocalConnection) and its provider
//! - [`lifecycle`]: [`InspectionSystem`](lifecycle::InspectionSystem)

pub mod connection;
pub mod lifecycle;
pub mod resources;
