//! `asset`: the asset the runtime inspects. Every field is static.

use super::unknown_field;
use resource_framework::{Args, Computation, Resource, ResourceCore, Result, Runtime, Value};

pub struct AssetResource {
    core: ResourceCore,
}

/// One instance per asset, keyed by the asset's mrn. Keyword arguments
/// override the fields taken from the runtime's asset.
pub fn new(runtime: &Runtime, args: Args) -> Result<Box<dyn Resource>> {
    let asset = runtime.asset();
    let mut core = runtime.new_resource("asset");
    core.set_id(asset.mrn.as_str());

    let mut fields = Args::new();
    fields.insert("name".into(), Value::from(asset.name.as_str()));
    fields.insert("mrn".into(), Value::from(asset.mrn.as_str()));
    fields.insert(
        "platform_ids".into(),
        Value::Array(asset.platform_ids.iter().map(|p| Value::from(p.as_str())).collect()),
    );
    fields.extend(args);
    core.init_fields(fields);

    Ok(Box::new(AssetResource { core }))
}

impl Resource for AssetResource {
    fn core(&self) -> &ResourceCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ResourceCore {
        &mut self.core
    }

    fn compute(&self, field: &str, _runtime: &Runtime) -> Computation {
        unknown_field(&self.core, field)
    }
}
