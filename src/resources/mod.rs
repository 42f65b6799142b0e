//! # Sample Resource Pack
//!
//! A small pack of resources that exercises every path of the runtime:
//!
//! | Resource | Demonstrates |
//! |----------|--------------|
//! | `asset` | static fields initialized from the runtime's asset |
//! | `os` | fields computed from the connection, an implicit child resource (`os.packages`) |
//! | `os.packages` (alias `packages`) | a list resource, injected list content, a dependent field (`count`) |
//! | `package` | mandatory static args, a field computed from two others (`purl`) |
//! | `file` | validation, dependent fields that react to a failed input (`exists`) |
//! | `command` | several fields computed from one memoized connection call |
//! | `kernel.module` | a declared class without a factory, served as a mock |
//!
//! The pack's schema is embedded from `schema.json`; [`registry`] loads it
//! and binds the factories of this module.

pub mod asset;
pub mod command;
pub mod file;
pub mod os;
pub mod packages;

use resource_framework::{Computation, FrameworkError, Registry, ResourceCore, Result, SchemaDocument};

/// The pack's schema document.
pub const SCHEMA: &str = include_str!("schema.json");

/// A registry holding the pack's schema with every factory bound.
pub fn registry() -> Result<Registry> {
    let doc = SchemaDocument::from_json(SCHEMA)?;
    let mut registry = Registry::from_schema(&doc)?;
    bind(&mut registry)?;
    Ok(registry)
}

/// Binds the pack's factories to an already loaded registry.
pub fn bind(registry: &mut Registry) -> Result<()> {
    registry.add_factory("asset", asset::new)?;
    registry.add_factory("command", command::new)?;
    registry.add_factory("file", file::new)?;
    registry.add_factory("os", os::new)?;
    registry.add_factory("os.packages", packages::new_list)?;
    registry.add_factory("package", packages::new_package)?;
    Ok(())
}

/// Runs `command` over the resource's connection and returns its stdout.
/// A non-zero exit status is a computation error carrying stderr.
pub(crate) fn run_checked(core: &ResourceCore, command: &str) -> Result<String> {
    let output = core.connection().run_command(command)?;
    if output.exit_status != 0 {
        return Err(FrameworkError::computation(format!(
            "`{command}` exited with {}: {}",
            output.exit_status,
            output.stderr.trim()
        )));
    }
    Ok(output.stdout)
}

/// The outcome for a field the implementation does not compute.
pub(crate) fn unknown_field(core: &ResourceCore, field: &str) -> Computation {
    Computation::Failed(FrameworkError::FieldNotFound {
        resource: core.name().to_owned(),
        field: field.to_owned(),
    })
}
