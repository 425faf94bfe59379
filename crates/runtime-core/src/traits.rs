//! Backend contract traits.

use std::sync::Arc;

use async_trait::async_trait;
use model::{
    BacktestRun, BacktestSpec, BacktestStatus, DataAvailability, DataDownloadSpec,
    DataDownloadStatus, LogOptions, UpdateBotSpec, WorkloadSpec, WorkloadStatus,
};

use crate::api::BotApiClient;
use crate::error::RuntimeError;

/// Contract every workload backend implements.
///
/// All operations are direct async calls against the backing engine;
/// nothing is cached between calls. A `bot_id` that resolves to no
/// container yields [`ErrorKind::NotFound`](crate::ErrorKind::NotFound).
#[async_trait]
pub trait Runtime: Send + Sync {
    /// Provision and start a new bot workload. Returns the backend's
    /// container id.
    ///
    /// On any failure the backend removes whatever it already
    /// provisioned (config files, a created-but-unstarted container)
    /// before the error returns.
    async fn create_bot(&self, spec: &WorkloadSpec) -> Result<String, RuntimeError>;

    /// Stop and remove the workload's container and its injected
    /// config namespace.
    async fn delete_bot(&self, bot_id: &str) -> Result<(), RuntimeError>;

    /// Start a stopped workload.
    async fn start_bot(&self, bot_id: &str) -> Result<(), RuntimeError>;

    /// Stop a running workload, honoring the configured stop timeout.
    async fn stop_bot(&self, bot_id: &str) -> Result<(), RuntimeError>;

    /// Restart a workload in place.
    async fn restart_bot(&self, bot_id: &str) -> Result<(), RuntimeError>;

    /// Inspect the workload and return its normalized status, with a
    /// best-effort resource snapshot.
    async fn bot_status(&self, bot_id: &str) -> Result<WorkloadStatus, RuntimeError>;

    /// The container's address on the backend network.
    async fn container_ip(&self, bot_id: &str) -> Result<String, RuntimeError>;

    /// Base URL for the bot's API via the host-mapped port.
    async fn bot_api_url(&self, bot_id: &str) -> Result<String, RuntimeError>;

    /// HTTP client wired to whichever of the bot's addresses answers:
    /// the container address is probed first, the host-mapped URL is
    /// the fallback.
    async fn bot_api_client(&self, bot_id: &str) -> Result<BotApiClient, RuntimeError>;

    /// Fetch (a slice of) the workload's log output.
    async fn bot_logs(&self, bot_id: &str, opts: &LogOptions) -> Result<String, RuntimeError>;

    /// Apply resource-limit and config-layer changes to a live
    /// workload, optionally restarting it to pick them up.
    async fn update_bot(&self, bot_id: &str, update: &UpdateBotSpec) -> Result<(), RuntimeError>;

    /// Status of every managed workload on this backend. Containers
    /// that disappear between listing and inspection are skipped.
    async fn list_bots(&self) -> Result<Vec<WorkloadStatus>, RuntimeError>;

    /// Verify the backing engine is reachable.
    async fn health_check(&self) -> Result<(), RuntimeError>;
}

/// One-shot backtest execution against an isolated workspace.
#[async_trait]
pub trait BacktestRunner: Send + Sync {
    /// Launch a backtest container. The returned run id names the
    /// workspace and the container for later calls.
    async fn run(&self, spec: &BacktestSpec) -> Result<BacktestRun, RuntimeError>;

    /// Derive the run's state from its container.
    async fn status(&self, run_id: &str) -> Result<BacktestStatus, RuntimeError>;

    /// Fetch the run's log output.
    async fn logs(&self, run_id: &str, opts: &LogOptions) -> Result<String, RuntimeError>;

    /// Remove the run's container and workspace.
    async fn cleanup(&self, run_id: &str) -> Result<(), RuntimeError>;
}

/// Disposable data-refresh task execution.
#[async_trait]
pub trait DataDownloader: Send + Sync {
    /// Launch a download task container. Returns the backend-assigned
    /// task id.
    async fn start(&self, spec: &DataDownloadSpec) -> Result<String, RuntimeError>;

    /// Derive the task's state and progress from its container.
    async fn status(&self, task_id: &str) -> Result<DataDownloadStatus, RuntimeError>;

    /// Parse the availability report the task printed between its log
    /// markers. Only meaningful once the task completed.
    async fn report(&self, task_id: &str) -> Result<DataAvailability, RuntimeError>;

    /// Remove the task's container.
    async fn cleanup(&self, task_id: &str) -> Result<(), RuntimeError>;
}

/// A shared runtime backend handle.
pub type SharedRuntime = Arc<dyn Runtime>;

/// A shared backtest runner handle.
pub type SharedBacktestRunner = Arc<dyn BacktestRunner>;

/// A shared data downloader handle.
pub type SharedDataDownloader = Arc<dyn DataDownloader>;
