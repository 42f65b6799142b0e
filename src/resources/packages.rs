//! `os.packages` and `package`.
//!
//! The package list is read from `dpkg-query` unless it was injected at
//! creation (`list` keyword argument), in which case it is never computed.
//! Every listed entry is a `package` instance, deduplicated by name, so a
//! package created on its own and the same package found in the list are
//! one instance.

use super::{run_checked, unknown_field};
use resource_framework::{
    kwargs, ready, Args, Computation, Dependencies, FrameworkError, Resource, ResourceCore, Result, Runtime, Value,
};

pub const PACKAGES_COMMAND: &str = "dpkg-query -W -f='${Package} ${Version}\\n'";

// =============================================================================
// os.packages
// =============================================================================

pub struct PackageList {
    core: ResourceCore,
}

/// One list per asset, keyed by the asset's mrn.
pub fn new_list(runtime: &Runtime, args: Args) -> Result<Box<dyn Resource>> {
    let mut core = runtime.new_resource("os.packages");
    core.set_id(runtime.asset().mrn.as_str());
    core.init_fields(args);
    Ok(Box::new(PackageList { core }))
}

impl Resource for PackageList {
    fn core(&self) -> &ResourceCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ResourceCore {
        &mut self.core
    }

    fn register(&self, field: &str, deps: &Dependencies<'_>) -> Result<()> {
        match field {
            "count" => deps.watch_own("list"),
            _ => Ok(()),
        }
    }

    fn compute(&self, field: &str, runtime: &Runtime) -> Computation {
        match field {
            "list" => {
                let stdout = match run_checked(&self.core, PACKAGES_COMMAND) {
                    Ok(stdout) => stdout,
                    Err(e) => return Computation::Failed(e),
                };
                parse_dpkg(&stdout)
                    .into_iter()
                    .map(|(name, version)| {
                        runtime
                            .create_resource("package", &kwargs!["name" => name, "version" => version])
                            .map(Value::Resource)
                    })
                    .collect::<Result<Vec<_>>>()
                    .map(Value::Array)
                    .into()
            }
            "count" => {
                let list = ready!(self.field("list"));
                Computation::ready(list.as_array().map_or(0, <[Value]>::len) as i64)
            }
            _ => unknown_field(&self.core, field),
        }
    }
}

/// Parses `name version` lines. Lines without a version are skipped.
pub fn parse_dpkg(stdout: &str) -> Vec<(&str, &str)> {
    stdout
        .lines()
        .filter_map(|line| line.trim().split_once(' '))
        .map(|(name, version)| (name.trim(), version.trim()))
        .filter(|(name, version)| !name.is_empty() && !version.is_empty())
        .collect()
}

// =============================================================================
// package
// =============================================================================

pub struct Package {
    core: ResourceCore,
    name: String,
}

/// Packages are keyed by name.
pub fn new_package(runtime: &Runtime, args: Args) -> Result<Box<dyn Resource>> {
    let name = args
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    let mut core = runtime.new_resource("package");
    core.set_id(name.as_str());
    core.init_fields(args);
    Ok(Box::new(Package { core, name }))
}

impl Resource for Package {
    fn core(&self) -> &ResourceCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ResourceCore {
        &mut self.core
    }

    fn register(&self, field: &str, deps: &Dependencies<'_>) -> Result<()> {
        if field == "purl" {
            deps.watch_own("name")?;
            deps.watch_own("version")?;
        }
        Ok(())
    }

    fn compute(&self, field: &str, _runtime: &Runtime) -> Computation {
        match field {
            "version" => Computation::Failed(FrameworkError::computation(format!(
                "version of package '{}' is unknown",
                self.name
            ))),
            "purl" => {
                let name = ready!(self.field("name"));
                let version = ready!(self.field("version"));
                Computation::ready(format!(
                    "pkg:deb/{}@{}",
                    name.as_str().unwrap_or_default(),
                    version.as_str().unwrap_or_default()
                ))
            }
            _ => unknown_field(&self.core, field),
        }
    }
}
