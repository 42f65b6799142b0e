use crate::resources;
use parking_lot::Mutex;
use resource_framework::{
    Asset, Connection, ConnectionProvider, FrameworkError, Registry, Result, Runtime, RuntimeConfig, Value, WorkerPool,
};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Watcher id used by scan runtimes. Each scan runtime serves one query.
const SCAN_WATCHER: &str = "scan";

/// The runtime orchestrator for inspecting an asset with the sample pack.
///
/// `InspectionSystem` is responsible for:
/// - **Startup**: loading the pack's schema and factories into a registry
/// - **Queries**: turning "field X of resource Y" into a value
/// - **Scans**: running one query across many assets in parallel
/// - **Shutdown**: dropping subscriptions and closing connections
///
/// # Example
///
/// ```no_run
/// use inspect_recipe::connection::{LocalConnection, LocalProvider};
/// use inspect_recipe::lifecycle::InspectionSystem;
/// use resource_framework::{kwargs, Asset, RuntimeConfig};
/// use std::sync::Arc;
///
/// let system = InspectionSystem::new(
///     RuntimeConfig::default(),
///     Asset::new("//assets/localhost", "localhost"),
///     Arc::new(LocalConnection::new()),
///     Arc::new(LocalProvider),
/// )?;
/// let size = system.evaluate("file", &kwargs!["path" => "/etc/hostname"], "size")?;
/// system.shutdown();
/// # Ok::<(), resource_framework::FrameworkError>(())
/// ```
pub struct InspectionSystem {
    registry: Arc<Registry>,
    runtime: Runtime,
    provider: Arc<dyn ConnectionProvider>,
    pool: WorkerPool,
    config: RuntimeConfig,

    /// Every query watcher subscribed so far (used for shutdown)
    watchers: Mutex<Vec<String>>,
    next_query: AtomicU64,
}

impl InspectionSystem {
    /// Loads the sample pack and starts a runtime for `asset` over
    /// `connection`. `provider` opens the connections of
    /// [`scan_assets`](Self::scan_assets).
    pub fn new(
        config: RuntimeConfig,
        asset: Asset,
        connection: Arc<dyn Connection>,
        provider: Arc<dyn ConnectionProvider>,
    ) -> Result<Self> {
        let registry = Arc::new(resources::registry()?);
        let runtime = Runtime::new(registry.clone(), asset, connection).with_config(config.clone());
        info!(
            asset = %runtime.asset().name,
            classes = registry.len(),
            workers = config.workers,
            "Inspection system started"
        );

        Ok(Self {
            registry,
            runtime,
            provider,
            pool: WorkerPool::new(config.workers),
            config,
            watchers: Mutex::new(Vec::new()),
            next_query: AtomicU64::new(1),
        })
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Creates `resource` from `args` and returns the value of `field`.
    ///
    /// Fails with the field's own error if its computation failed, and with
    /// `Unresolved` if it is still waiting for an input.
    pub fn evaluate(&self, resource: &str, args: &[Value], field: &str) -> Result<Value> {
        let watcher = format!("query-{}", self.next_query.fetch_add(1, Ordering::Relaxed));
        self.watchers.lock().push(watcher.clone());
        debug!(resource, field, watcher = %watcher, "Evaluating");
        resolve_field(&self.runtime, resource, args, field, &watcher)
    }

    /// Evaluates `field` of `resource` on every asset, each in its own
    /// runtime over a connection from the provider. Results keep the order
    /// of `assets`.
    pub async fn scan_assets(&self, assets: Vec<Asset>, resource: &str, field: &str) -> Vec<ScanResult> {
        let jobs: Vec<_> = assets
            .iter()
            .cloned()
            .map(|asset| {
                let registry = self.registry.clone();
                let provider = self.provider.clone();
                let config = self.config.clone();
                let resource = resource.to_owned();
                let field = field.to_owned();
                move || -> Result<Value> {
                    let connection = provider.connect(&asset)?;
                    let runtime = Runtime::new(registry, asset, connection).with_config(config);
                    let value = resolve_field(&runtime, &resource, &[], &field, SCAN_WATCHER);
                    runtime.unregister(SCAN_WATCHER);
                    runtime.close();
                    value
                }
            })
            .collect();

        info!(assets = assets.len(), resource, field, "Scanning assets");
        let results = self.pool.run(jobs).await;

        assets
            .into_iter()
            .zip(results)
            .map(|(asset, result)| {
                if let Err(e) = &result {
                    error!(asset = %asset.name, error = %e, "Scan failed");
                }
                ScanResult { asset, result }
            })
            .collect()
    }

    /// Unregisters every query watcher and closes every connection handle.
    pub fn shutdown(self) {
        let watchers = std::mem::take(&mut *self.watchers.lock());
        let removed: usize = watchers.iter().map(|w| self.runtime.unregister(w)).sum();
        let closed = self.runtime.close();
        info!(watchers = watchers.len(), removed, closed, "Inspection system stopped");
    }
}

/// Creates `resource` in `runtime` and returns `field` as delivered to
/// `watcher`.
fn resolve_field(runtime: &Runtime, resource: &str, args: &[Value], field: &str, watcher: &str) -> Result<Value> {
    let instance = runtime.create_resource(resource, args)?;
    let slot: Arc<Mutex<Option<Result<Value>>>> = Arc::new(Mutex::new(None));
    let delivered = slot.clone();
    runtime.watch_and_update(&instance, field, watcher, move |result| {
        *delivered.lock() = Some(result);
    })?;

    let delivered = slot.lock().take();
    delivered.unwrap_or_else(|| {
        Err(FrameworkError::Unresolved {
            resource: instance.core().resource_id().to_string(),
            field: field.to_owned(),
        })
    })
}

/// The outcome of a scan on one asset.
#[derive(Debug)]
pub struct ScanResult {
    pub asset: Asset,
    pub result: Result<Value>,
}

/// A printable view of a [`ScanResult`].
#[derive(Debug, Serialize)]
pub struct ScanSummary {
    pub asset: String,
    pub mrn: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScanResult {
    pub fn summary(&self) -> ScanSummary {
        let (value, error) = match &self.result {
            Ok(value) => (Some(format!("{value:?}")), None),
            Err(e) => (None, Some(e.to_string())),
        };
        ScanSummary {
            asset: self.asset.name.clone(),
            mrn: self.asset.mrn.clone(),
            value,
            error,
        }
    }
}
