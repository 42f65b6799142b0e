//! # Framework Errors
//!
//! This module defines the error type shared by the registry, the runtime and
//! every resource implementation.
//!
//! Two kinds of failure travel through this enum:
//!
//! - **Structural errors** (merge conflicts, unknown factories, unknown
//!   resources) are returned directly to whoever loads a schema or creates a
//!   resource and are expected to be fatal at startup.
//! - **Field errors** (a failed command, a missing file) are stored in the
//!   field's cache entry and delivered to every watcher of that field. For
//!   that reason the type is `Clone`.
//!
//! "Not ready yet" is not an error. It is the `NotReady` case of
//! [`Computation`](crate::resource::Computation) and
//! [`Readiness`](crate::runtime::Readiness).

/// Errors that can occur within the resource framework.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FrameworkError {
    #[error("cannot find resource '{0}'")]
    ResourceNotFound(String),
    #[error("cannot find field '{field}' in resource '{resource}'")]
    FieldNotFound { resource: String, field: String },
    #[error("cannot find cached resource {name} ID: {id}")]
    InstanceNotFound { name: String, id: String },
    #[error("cannot find resource factory for '{0}'")]
    FactoryNotFound(String),
    #[error("cannot bind a factory to '{0}', the resource is not declared")]
    UnknownFactoryBinding(String),
    #[error("mock resources don't take any arguments, resource '{0}' doesn't have a resource factory")]
    MockArguments(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("failed to create resource '{resource}': {message}")]
    Factory { resource: String, message: String },
    #[error("failed to validate resource '{resource}': {message}")]
    Validation { resource: String, message: String },
    #[error("conflicting definitions for resource '{id}': {reason}")]
    MergeConflict { id: String, reason: String },
    #[error("{0}")]
    Computation(String),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("cannot trigger a resource without specifying a field")]
    EmptyField,
    #[error("field '{field}' of '{resource}' is not ready and nothing is watching it")]
    UnobservedTrigger { resource: String, field: String },
    #[error("field '{field}' of '{resource}' did not resolve")]
    Unresolved { resource: String, field: String },
    #[error("invalid schema: {0}")]
    Schema(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("worker pool failure: {0}")]
    Pool(String),
}

impl FrameworkError {
    /// Shorthand for a computation failure with a formatted message.
    pub fn computation(message: impl Into<String>) -> Self {
        FrameworkError::Computation(message.into())
    }
}

impl From<serde_json::Error> for FrameworkError {
    fn from(e: serde_json::Error) -> Self {
        FrameworkError::Schema(e.to_string())
    }
}

/// Result alias used throughout the framework.
pub type Result<T> = std::result::Result<T, FrameworkError>;
