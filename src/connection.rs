//! # Local Connection
//!
//! A [`Connection`] to the host the scan runs on: commands go through
//! `sh -c`, files are read from the local filesystem.

use resource_framework::{Asset, CommandOutput, Connection, ConnectionProvider, FrameworkError, Result};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone, Debug, Default)]
pub struct LocalConnection;

impl LocalConnection {
    pub fn new() -> Self {
        Self
    }
}

impl Connection for LocalConnection {
    fn id(&self) -> String {
        "local".into()
    }

    fn run_command(&self, command: &str) -> Result<CommandOutput> {
        debug!(command, "Running local command");
        let output = std::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .output()
            .map_err(|e| FrameworkError::Connection(format!("cannot run `{command}`: {e}")))?;
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            // killed by a signal
            exit_status: output.status.code().unwrap_or(-1),
        })
    }

    fn read_file(&self, path: &str) -> Result<String> {
        std::fs::read_to_string(path).map_err(|e| FrameworkError::Connection(format!("cannot read '{path}': {e}")))
    }
}

/// Connects every asset to the local host.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalProvider;

impl ConnectionProvider for LocalProvider {
    fn connect(&self, asset: &Asset) -> Result<Arc<dyn Connection>> {
        debug!(asset = %asset.name, "Connecting locally");
        Ok(Arc::new(LocalConnection::new()))
    }
}
