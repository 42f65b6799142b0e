//! `os`: the operating system of the asset.

use super::{run_checked, unknown_field};
use resource_framework::{Args, Computation, Resource, ResourceCore, Result, Runtime, Value};

pub const HOSTNAME_COMMAND: &str = "hostname";
pub const KERNEL_COMMAND: &str = "uname -r";

pub struct Os {
    core: ResourceCore,
}

/// One instance per asset, keyed by the asset's mrn.
pub fn new(runtime: &Runtime, args: Args) -> Result<Box<dyn Resource>> {
    let mut core = runtime.new_resource("os");
    core.set_id(runtime.asset().mrn.as_str());
    core.init_fields(args);
    Ok(Box::new(Os { core }))
}

impl Resource for Os {
    fn core(&self) -> &ResourceCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ResourceCore {
        &mut self.core
    }

    fn compute(&self, field: &str, runtime: &Runtime) -> Computation {
        match field {
            "hostname" => run_checked(&self.core, HOSTNAME_COMMAND)
                .map(|out| Value::from(out.trim()))
                .into(),
            "kernel" => run_checked(&self.core, KERNEL_COMMAND)
                .map(|out| Value::from(out.trim()))
                .into(),
            // implicit child resource
            "packages" => runtime
                .create_resource("os.packages", &[])
                .map(Value::Resource)
                .into(),
            _ => unknown_field(&self.core, field),
        }
    }
}
