//! # Observability & Tracing
//!
//! Structured logging for the runtime, built on the `tracing` crate.
//!
//! ## Configuration
//!
//! Verbosity follows the `RUST_LOG` environment variable. The output uses the
//! compact format and hides the module prefix (`with_target(false)`); the
//! structured fields (`resource`, `id`, `field`, `watcher`) already say where
//! an event comes from.
//!
//! ```bash
//! # Instance scopes, connection handles, schema summaries
//! RUST_LOG=info cargo run
//!
//! # Mock instances and worker pool activity
//! RUST_LOG=debug cargo run
//!
//! # Every watch, trigger, settle and broadcast
//! RUST_LOG=trace cargo run
//! ```
//!
//! ## What Gets Traced
//!
//! | Level | Events |
//! |-------|--------|
//! | `trace` | `Watch and update`, `Watch and compute`, `Trigger`, `Settled`, `Not ready`, `Broadcast` |
//! | `debug` | `Schema loaded`, `Created mock resource`, `Unwatched`, `Worker pool started` |
//! | `info` | `Opened asset scope`, `Connection closed`, `Runtime closed` |
//! | `warn` | unobserved triggers (non-strict mode), failed pool jobs |
//!
//! A `RUST_LOG=trace` run of a single dependent field looks like:
//!
//! ```text
//! TRACE Watch and update resource="file" id="/etc/hostname" field="size" watcher="q1" initial=true exists=false
//! TRACE Watch and compute src=file//etc/hostname/content dst=file//etc/hostname/size initial=true exists=false
//! TRACE Settled resource="file" id="/etc/hostname" field="content"
//! TRACE Broadcast uid=file//etc/hostname/content watchers=1
//! TRACE Settled resource="file" id="/etc/hostname" field="size"
//! ```

/// Installs the global subscriber. Panics if one is already installed.
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();
}

/// Like [`setup_tracing`], but returns `false` instead of panicking when a
/// subscriber is already installed. Meant for tests.
pub fn try_setup_tracing() -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .with_test_writer()
        .try_init()
        .is_ok()
}
