//! # Mock Framework & Testing Guide
//!
//! Test doubles for driving the runtime without a real asset.
//!
//! | Double | Stands in for | Use it to |
//! |--------|---------------|-----------|
//! | [`MockConnection`] | a [`Connection`] | script command and file results, count calls and closes |
//! | [`Script`] / [`ScriptedResource`] | a generated resource class | script per-field compute and dependencies, count computations |
//!
//! ## Scripting a connection
//!
//! ```rust
//! use resource_framework::mock::MockConnection;
//! use resource_framework::Connection;
//!
//! let conn = MockConnection::new("local");
//! conn.expect_command("uname -s").return_ok("Linux\n");
//! conn.expect_file("/etc/hostname").return_ok("web-1\n");
//!
//! assert_eq!(conn.run_command("uname -s").unwrap().stdout, "Linux\n");
//! assert_eq!(conn.read_file("/etc/hostname").unwrap(), "web-1\n");
//! conn.verify(); // every expectation was used
//! ```
//!
//! ## Scripting a resource
//!
//! A [`Script`] describes one resource class: how each field is computed
//! and which fields it depends on. Binding it to a registry installs a
//! factory that builds [`ScriptedResource`] instances from keyword args.
//!
//! ```rust
//! use resource_framework::mock::{MockConnection, Script};
//! use resource_framework::{kwargs, ready, Asset, Computation, FieldInfo, Registry, Resource, ResourceInfo, Runtime, Value};
//! use std::sync::Arc;
//!
//! let mut registry = Registry::new();
//! registry.add_resource_info(
//!     ResourceInfo::new("greeting")
//!         .field(FieldInfo::new("name", "string"))
//!         .field(FieldInfo::new("text", "string")),
//! ).unwrap();
//!
//! let script = Script::new("greeting")
//!     .depends_on("text", &["name"])
//!     .compute("text", |res, _rt| {
//!         let name = ready!(res.field("name"));
//!         Computation::ready(format!("hello {}", name.as_str().unwrap_or_default()))
//!     });
//! script.bind(&mut registry).unwrap();
//!
//! let rt = Runtime::new(Arc::new(registry), Asset::default(), Arc::new(MockConnection::new("m")));
//! let greeting = rt.create_resource("greeting", &kwargs!["name" => "bob"]).unwrap();
//! rt.watch_and_update(&greeting, "text", "q1", |value| {
//!     assert_eq!(value.unwrap(), Value::from("hello bob"));
//! }).unwrap();
//! assert_eq!(script.computations("text"), 1);
//! ```

use crate::asset::{CommandOutput, Connection};
use crate::error::{FrameworkError, Result};
use crate::registry::Registry;
use crate::resource::{Computation, Dependencies, Resource, ResourceCore};
use crate::runtime::Runtime;
use crate::value::{Args, Value};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// =============================================================================
// MOCK CONNECTION
// =============================================================================

struct Expectation<T> {
    response: Result<T>,
    hits: usize,
}

/// A [`Connection`] answering from scripted expectations.
///
/// Unscripted commands and files fail with [`FrameworkError::Connection`].
pub struct MockConnection {
    id: String,
    commands: Arc<Mutex<HashMap<String, Expectation<CommandOutput>>>>,
    files: Arc<Mutex<HashMap<String, Expectation<String>>>>,
    calls: AtomicUsize,
    closes: AtomicUsize,
}

impl fmt::Debug for MockConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockConnection")
            .field("id", &self.id)
            .field("calls", &self.call_count())
            .field("closes", &self.close_count())
            .finish()
    }
}

impl MockConnection {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            commands: Arc::default(),
            files: Arc::default(),
            calls: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        }
    }

    /// Expects `command` to be run.
    pub fn expect_command(&self, command: &str) -> CommandExpectationBuilder {
        CommandExpectationBuilder {
            command: command.to_owned(),
            commands: self.commands.clone(),
        }
    }

    /// Expects `path` to be read.
    pub fn expect_file(&self, path: &str) -> FileExpectationBuilder {
        FileExpectationBuilder {
            path: path.to_owned(),
            files: self.files.clone(),
        }
    }

    /// Panics unless every expectation was used at least once.
    pub fn verify(&self) {
        let mut unused: Vec<String> = self
            .commands
            .lock()
            .iter()
            .filter(|(_, e)| e.hits == 0)
            .map(|(cmd, _)| format!("command `{cmd}`"))
            .collect();
        unused.extend(
            self.files
                .lock()
                .iter()
                .filter(|(_, e)| e.hits == 0)
                .map(|(path, _)| format!("file `{path}`")),
        );
        if !unused.is_empty() {
            unused.sort();
            panic!("Not all expectations were met: {}", unused.join(", "));
        }
    }

    /// Total commands run and files read.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// How often `command` was run.
    pub fn command_hits(&self, command: &str) -> usize {
        self.commands.lock().get(command).map_or(0, |e| e.hits)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl Connection for MockConnection {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn run_command(&self, command: &str) -> Result<CommandOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut commands = self.commands.lock();
        let expectation = commands
            .get_mut(command)
            .ok_or_else(|| FrameworkError::Connection(format!("unexpected command `{command}`")))?;
        expectation.hits += 1;
        expectation.response.clone()
    }

    fn read_file(&self, path: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut files = self.files.lock();
        let expectation = files
            .get_mut(path)
            .ok_or_else(|| FrameworkError::Connection(format!("unexpected file `{path}`")))?;
        expectation.hits += 1;
        expectation.response.clone()
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Builder for command expectations.
pub struct CommandExpectationBuilder {
    command: String,
    commands: Arc<Mutex<HashMap<String, Expectation<CommandOutput>>>>,
}

impl CommandExpectationBuilder {
    /// Succeeds with `stdout` and exit status 0.
    pub fn return_ok(self, stdout: &str) {
        self.return_output(CommandOutput {
            stdout: stdout.to_owned(),
            ..CommandOutput::default()
        });
    }

    pub fn return_output(self, output: CommandOutput) {
        self.respond(Ok(output));
    }

    pub fn return_err(self, error: FrameworkError) {
        self.respond(Err(error));
    }

    fn respond(self, response: Result<CommandOutput>) {
        self.commands
            .lock()
            .insert(self.command, Expectation { response, hits: 0 });
    }
}

/// Builder for file expectations.
pub struct FileExpectationBuilder {
    path: String,
    files: Arc<Mutex<HashMap<String, Expectation<String>>>>,
}

impl FileExpectationBuilder {
    pub fn return_ok(self, content: &str) {
        self.respond(Ok(content.to_owned()));
    }

    pub fn return_err(self, error: FrameworkError) {
        self.respond(Err(error));
    }

    fn respond(self, response: Result<String>) {
        self.files
            .lock()
            .insert(self.path, Expectation { response, hits: 0 });
    }
}

// =============================================================================
// SCRIPTED RESOURCES
// =============================================================================

type ComputeFn = Arc<dyn Fn(&ScriptedResource, &Runtime) -> Computation + Send + Sync>;
type RegisterFn = Arc<dyn Fn(&Dependencies<'_>) -> Result<()> + Send + Sync>;

/// Describes a resource class for tests. Cheap to clone; clones share their
/// computation counters.
#[derive(Clone)]
pub struct Script {
    name: String,
    id_field: Option<String>,
    computes: HashMap<String, ComputeFn>,
    registers: HashMap<String, RegisterFn>,
    counters: Arc<Mutex<HashMap<String, usize>>>,
}

impl Script {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id_field: None,
            computes: HashMap::new(),
            registers: HashMap::new(),
            counters: Arc::default(),
        }
    }

    /// Instances take their id from this keyword argument.
    pub fn id_from(mut self, field: &str) -> Self {
        self.id_field = Some(field.to_owned());
        self
    }

    pub fn compute<F>(mut self, field: &str, compute: F) -> Self
    where
        F: Fn(&ScriptedResource, &Runtime) -> Computation + Send + Sync + 'static,
    {
        self.computes.insert(field.to_owned(), Arc::new(compute));
        self
    }

    /// `field` always computes to `value`.
    pub fn constant(self, field: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.compute(field, move |_, _| Computation::Ready(value.clone()))
    }

    pub fn register<F>(mut self, field: &str, register: F) -> Self
    where
        F: Fn(&Dependencies<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.registers.insert(field.to_owned(), Arc::new(register));
        self
    }

    /// `field` is recomputed whenever one of `sources` (fields of the same
    /// instance) settles.
    pub fn depends_on(self, field: &str, sources: &[&str]) -> Self {
        let sources: Vec<String> = sources.iter().map(|s| s.to_string()).collect();
        self.register(field, move |deps| {
            sources.iter().try_for_each(|source| deps.watch_own(source))
        })
    }

    /// How often `field` was computed, across all instances.
    pub fn computations(&self, field: &str) -> usize {
        self.counters.lock().get(field).copied().unwrap_or(0)
    }

    /// A factory building [`ScriptedResource`]s. Keyword args become
    /// static fields.
    pub fn factory(&self) -> impl Fn(&Runtime, Args) -> Result<Box<dyn Resource>> + Send + Sync + 'static {
        let script = self.clone();
        move |runtime, args| {
            let mut core = runtime.new_resource(&script.name);
            if let Some(id_field) = &script.id_field {
                if let Some(id) = args.get(id_field) {
                    let id = match id {
                        Value::String(s) => s.clone(),
                        other => format!("{other:?}"),
                    };
                    core.set_id(id);
                }
            }
            core.init_fields(args);
            Ok(Box::new(ScriptedResource {
                core,
                script: script.clone(),
            }) as Box<dyn Resource>)
        }
    }

    /// Binds [`Script::factory`] to the class of the same name.
    pub fn bind(&self, registry: &mut Registry) -> Result<()> {
        registry.add_factory(&self.name, self.factory())
    }
}

/// Instance built by a [`Script`].
pub struct ScriptedResource {
    core: ResourceCore,
    script: Script,
}

impl Resource for ScriptedResource {
    fn core(&self) -> &ResourceCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ResourceCore {
        &mut self.core
    }

    fn register(&self, field: &str, deps: &Dependencies<'_>) -> Result<()> {
        match self.script.registers.get(field) {
            Some(register) => register(deps),
            None => Ok(()),
        }
    }

    fn compute(&self, field: &str, runtime: &Runtime) -> Computation {
        *self.script.counters.lock().entry(field.to_owned()).or_default() += 1;
        match self.script.computes.get(field) {
            Some(compute) => compute(self, runtime),
            None => Computation::Failed(FrameworkError::FieldNotFound {
                resource: self.core.name().to_owned(),
                field: field.to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unscripted_calls_fail() {
        let conn = MockConnection::new("m");
        assert!(matches!(
            conn.run_command("id"),
            Err(FrameworkError::Connection(_))
        ));
        assert_eq!(conn.call_count(), 1);
    }

    #[test]
    fn scripted_errors_are_returned() {
        let conn = MockConnection::new("m");
        conn.expect_file("/etc/shadow")
            .return_err(FrameworkError::Connection("permission denied".into()));
        assert_eq!(
            conn.read_file("/etc/shadow"),
            Err(FrameworkError::Connection("permission denied".into()))
        );
        conn.verify();
    }

    #[test]
    #[should_panic(expected = "Not all expectations were met")]
    fn verify_reports_unused_expectations() {
        let conn = MockConnection::new("m");
        conn.expect_command("uname -r").return_ok("6.1\n");
        conn.verify();
    }
}
