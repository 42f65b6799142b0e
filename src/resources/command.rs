//! `command`: a command run on the asset.
//!
//! The command runs at most once per instance; `stdout`, `stderr` and
//! `exit_code` all read the same output.

use super::unknown_field;
use resource_framework::{Args, CommandOutput, Computation, Resource, ResourceCore, Result, Runtime, Value};
use std::sync::OnceLock;

pub struct Command {
    core: ResourceCore,
    command: String,
    output: OnceLock<Result<CommandOutput>>,
}

/// Commands are keyed by their command line.
pub fn new(runtime: &Runtime, args: Args) -> Result<Box<dyn Resource>> {
    let command = args
        .get("command")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    let mut core = runtime.new_resource("command");
    core.set_id(command.as_str());
    core.init_fields(args);
    Ok(Box::new(Command {
        core,
        command,
        output: OnceLock::new(),
    }))
}

impl Command {
    fn output(&self) -> &Result<CommandOutput> {
        self.output
            .get_or_init(|| self.core.connection().run_command(&self.command))
    }
}

impl Resource for Command {
    fn core(&self) -> &ResourceCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ResourceCore {
        &mut self.core
    }

    fn compute(&self, field: &str, _runtime: &Runtime) -> Computation {
        if !matches!(field, "stdout" | "stderr" | "exit_code") {
            return unknown_field(&self.core, field);
        }
        let output = match self.output() {
            Ok(output) => output,
            Err(e) => return Computation::Failed(e.clone()),
        };
        match field {
            "stdout" => Computation::ready(output.stdout.as_str()),
            "stderr" => Computation::ready(output.stderr.as_str()),
            _ => Computation::ready(i64::from(output.exit_status)),
        }
    }
}
