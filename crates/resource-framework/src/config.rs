//! # Runtime Configuration
//!
//! Settings are read from JSON or from the environment. Missing keys keep
//! their defaults. Log verbosity is not configured here: it follows
//! `RUST_LOG` (see [`telemetry`](crate::telemetry)).

use crate::error::{FrameworkError, Result};
use serde::{Deserialize, Serialize};

pub const ENV_WORKERS: &str = "INSPECT_WORKERS";
pub const ENV_STRICT_TRIGGER: &str = "INSPECT_STRICT_TRIGGER";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Size of the worker pool used for scans across independent assets.
    pub workers: usize,
    /// Fail a `trigger` that comes back not ready for a field nobody
    /// watches. When off, the runtime only warns.
    pub strict_trigger: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            strict_trigger: true,
        }
    }
}

impl RuntimeConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| FrameworkError::Config(e.to_string()))
    }

    /// Defaults overridden by `INSPECT_WORKERS` and `INSPECT_STRICT_TRIGGER`.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(workers) = lookup(ENV_WORKERS) {
            config.workers = workers
                .trim()
                .parse()
                .map_err(|e| FrameworkError::Config(format!("{ENV_WORKERS}={workers}: {e}")))?;
        }
        if let Some(strict) = lookup(ENV_STRICT_TRIGGER) {
            config.strict_trigger = match strict.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                other => {
                    return Err(FrameworkError::Config(format!(
                        "{ENV_STRICT_TRIGGER}={other}: expected a boolean"
                    )))
                }
            };
        }
        Ok(config)
    }
}
