//! Process-wide map from backend tag to factory functions.
//!
//! Each backend registers its four factories once at startup; callers
//! resolve a tag from configuration and get fully health-checked
//! instances back. An unregistered tag is a configuration error, not a
//! transient fault.

use std::collections::HashMap;
use std::sync::OnceLock;

use futures_util::future::BoxFuture;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::RuntimeError;
use crate::traits::{SharedBacktestRunner, SharedDataDownloader, SharedRuntime};

/// Raw backend configuration as parsed from the caller's config file.
pub type BackendConfig = serde_json::Map<String, serde_json::Value>;

/// Identifies one registered backend implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BackendKind(&'static str);

impl BackendKind {
    /// Define a backend tag. Each backend crate declares its own as a
    /// constant and registers under it.
    pub const fn new(tag: &'static str) -> Self {
        Self(tag)
    }

    /// The tag as written in configuration files.
    pub fn as_str(&self) -> &'static str {
        self.0
    }

    /// Resolve a configured tag string against the registered
    /// backends.
    pub fn resolve(tag: &str) -> Result<Self, RuntimeError> {
        let registry = registry().read();
        registry
            .keys()
            .find(|kind| kind.0 == tag)
            .copied()
            .ok_or_else(|| {
                let known: Vec<&str> = registry.keys().map(|kind| kind.0).collect();
                RuntimeError::invalid_config(
                    "resolve_backend",
                    format!("unknown backend tag {:?} (registered: {:?})", tag, known),
                )
            })
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

/// Constructs a runtime backend from raw configuration.
pub type RuntimeCtor =
    fn(BackendConfig) -> BoxFuture<'static, Result<SharedRuntime, RuntimeError>>;

/// Constructs a backtest runner from raw configuration.
pub type BacktestRunnerCtor =
    fn(BackendConfig) -> BoxFuture<'static, Result<SharedBacktestRunner, RuntimeError>>;

/// Constructs a data downloader from raw configuration.
pub type DataDownloaderCtor =
    fn(BackendConfig) -> BoxFuture<'static, Result<SharedDataDownloader, RuntimeError>>;

/// Validates raw configuration without constructing anything.
pub type ConfigValidator = fn(&BackendConfig) -> Result<(), RuntimeError>;

/// The four factories a backend registers under its tag.
#[derive(Clone, Copy)]
pub struct BackendFactories {
    pub runtime: RuntimeCtor,
    pub backtest_runner: BacktestRunnerCtor,
    pub data_downloader: DataDownloaderCtor,
    pub validate_config: ConfigValidator,
}

static REGISTRY: OnceLock<RwLock<HashMap<BackendKind, BackendFactories>>> = OnceLock::new();

fn registry() -> &'static RwLock<HashMap<BackendKind, BackendFactories>> {
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Register a backend's factories under its tag. Last registration for
/// a tag wins.
pub fn register_backend(kind: BackendKind, factories: BackendFactories) {
    let replaced = registry().write().insert(kind, factories).is_some();
    if replaced {
        warn!(backend = %kind, "backend factories replaced");
    } else {
        debug!(backend = %kind, "backend registered");
    }
}

fn factories_for(op: &'static str, kind: BackendKind) -> Result<BackendFactories, RuntimeError> {
    registry().read().get(&kind).copied().ok_or_else(|| {
        RuntimeError::invalid_config(op, format!("backend {:?} is not registered", kind.as_str()))
    })
}

/// Validate raw configuration against the backend's registered
/// validator without constructing a client.
pub fn validate_backend_config(kind: BackendKind, config: &BackendConfig) -> Result<(), RuntimeError> {
    let factories = factories_for("validate_backend_config", kind)?;
    (factories.validate_config)(config)
}

/// Construct a runtime backend: validate, build, then health-check.
///
/// A backend whose health check fails is dropped and never returned;
/// callers either get a working instance or an error.
pub async fn connect_runtime(
    kind: BackendKind,
    config: BackendConfig,
) -> Result<SharedRuntime, RuntimeError> {
    let factories = factories_for("connect_runtime", kind)?;
    (factories.validate_config)(&config)?;

    let runtime = (factories.runtime)(config).await?;
    if let Err(err) = runtime.health_check().await {
        warn!(backend = %kind, error = %err, "backend failed post-construction health check");
        return Err(err);
    }

    debug!(backend = %kind, "runtime backend connected");
    Ok(runtime)
}

/// Construct a backtest runner for the tag. The constructor itself
/// verifies engine reachability before returning.
pub async fn connect_backtest_runner(
    kind: BackendKind,
    config: BackendConfig,
) -> Result<SharedBacktestRunner, RuntimeError> {
    let factories = factories_for("connect_backtest_runner", kind)?;
    (factories.validate_config)(&config)?;
    (factories.backtest_runner)(config).await
}

/// Construct a data downloader for the tag. The constructor itself
/// verifies engine reachability before returning.
pub async fn connect_data_downloader(
    kind: BackendKind,
    config: BackendConfig,
) -> Result<SharedDataDownloader, RuntimeError> {
    let factories = factories_for("connect_data_downloader", kind)?;
    (factories.validate_config)(&config)?;
    (factories.data_downloader)(config).await
}
