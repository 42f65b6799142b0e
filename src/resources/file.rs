//! `file`: a file on the asset, read through the connection.
//!
//! `content` is read once. `size` and `exists` are computed from it; a
//! failed read makes `size` fail and `exists` false.

use super::unknown_field;
use resource_framework::{
    ready, Args, Computation, Dependencies, FieldState, FrameworkError, Resource, ResourceCore, Result, Runtime, Value,
};

pub struct File {
    core: ResourceCore,
    path: String,
}

/// Files are keyed by path.
pub fn new(runtime: &Runtime, args: Args) -> Result<Box<dyn Resource>> {
    let path = args
        .get("path")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    let mut core = runtime.new_resource("file");
    core.set_id(path.as_str());
    core.init_fields(args);
    Ok(Box::new(File { core, path }))
}

impl Resource for File {
    fn core(&self) -> &ResourceCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ResourceCore {
        &mut self.core
    }

    fn register(&self, field: &str, deps: &Dependencies<'_>) -> Result<()> {
        match field {
            "exists" | "size" => deps.watch_own("content"),
            _ => Ok(()),
        }
    }

    fn compute(&self, field: &str, _runtime: &Runtime) -> Computation {
        match field {
            "content" => self.core.connection().read_file(&self.path).map(Value::from).into(),
            "exists" => match self.field("content") {
                FieldState::Ready(_) => Computation::ready(true),
                FieldState::Failed(_) => Computation::ready(false),
                FieldState::Pending => Computation::NotReady,
            },
            "size" => {
                let content = ready!(self.field("content"));
                Computation::ready(content.as_str().map_or(0, str::len) as i64)
            }
            _ => unknown_field(&self.core, field),
        }
    }

    /// Paths must be absolute; a missing path is reported by the mandatory
    /// field check.
    fn validate(&self) -> Result<()> {
        if !self.path.is_empty() && !self.path.starts_with('/') {
            return Err(FrameworkError::Validation {
                resource: "file".into(),
                message: format!("path '{}' is not absolute", self.path),
            });
        }
        Ok(())
    }
}
