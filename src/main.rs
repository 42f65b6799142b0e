//! # Inspect Recipe
//!
//! Inspects the local host with the sample resource pack.
//!
//! ## Quick Start
//!
//! ```bash
//! RUST_LOG=info cargo run            # lifecycle and results
//! RUST_LOG=trace cargo run           # every watch, trigger and broadcast
//! INSPECT_WORKERS=8 cargo run        # size of the scan worker pool
//! ```
//!
//! The demo:
//! 1. Starts an [`InspectionSystem`] bound to the local host.
//! 2. Evaluates a handful of fields, from static ones to dependent ones.
//! 3. Scans two asset records in parallel and prints the results as JSON.
//! 4. Shuts the system down.

use inspect_recipe::connection::{LocalConnection, LocalProvider};
use inspect_recipe::lifecycle::{InspectionSystem, ScanSummary};
use resource_framework::telemetry::setup_tracing;
use resource_framework::{kwargs, Asset, RuntimeConfig, Value};
use std::sync::Arc;
use tracing::{error, info, Instrument};

#[tokio::main]
async fn main() -> Result<(), String> {
    // Setup tracing once for the entire application
    setup_tracing();

    let config = RuntimeConfig::from_env().map_err(|e| e.to_string())?;
    let asset = Asset::new("//inspect/assets/localhost", "localhost");
    let system = InspectionSystem::new(
        config,
        asset,
        Arc::new(LocalConnection::new()),
        Arc::new(LocalProvider),
    )
    .map_err(|e| e.to_string())?;

    let queries: Vec<(&str, Vec<Value>, &str)> = vec![
        ("asset", kwargs![], "name"),
        ("os", kwargs![], "hostname"),
        ("os", kwargs![], "kernel"),
        ("file", kwargs!["path" => "/etc/hostname"], "size"),
        ("file", kwargs!["path" => "/etc/does-not-exist"], "exists"),
        ("command", kwargs!["command" => "uname -s"], "stdout"),
        ("packages", kwargs![], "count"),
        ("kernel.module", kwargs![], "loaded"),
    ];

    let span = tracing::info_span!("queries");
    async {
        for (resource, args, field) in &queries {
            match system.evaluate(resource, args, field) {
                Ok(value) => info!(resource, field, value = ?value, "Resolved"),
                Err(e) => error!(resource, field, error = %e, "Query failed"),
            }
        }
    }
    .instrument(span)
    .await;

    let assets = vec![
        Asset::new("//inspect/assets/localhost", "localhost"),
        Asset::new("//inspect/assets/localhost-2", "localhost-2"),
    ];
    let results = system.scan_assets(assets, "os", "hostname").await;
    let summaries: Vec<ScanSummary> = results.iter().map(|r| r.summary()).collect();
    let report = serde_json::to_string_pretty(&summaries).map_err(|e| e.to_string())?;
    println!("{report}");

    // Shutdown system gracefully
    system.shutdown();

    info!("Application completed successfully");
    Ok(())
}
