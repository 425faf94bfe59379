//! Backend-agnostic contract for managed bot workloads.
//!
//! Defines the [`Runtime`] trait every execution backend implements,
//! the companion [`BacktestRunner`] and [`DataDownloader`] traits for
//! short-lived containers, the single [`RuntimeError`] shape all of
//! them return, and a process-wide registry that maps a backend tag
//! from configuration to the backend's factory functions.

mod api;
mod error;
mod registry;
mod traits;

pub use api::BotApiClient;
pub use error::{BoxError, ErrorKind, RuntimeError};
pub use registry::{
    connect_backtest_runner, connect_data_downloader, connect_runtime, register_backend,
    validate_backend_config, BackendConfig, BackendFactories, BackendKind, BacktestRunnerCtor,
    ConfigValidator, DataDownloaderCtor, RuntimeCtor,
};
pub use traits::{
    BacktestRunner, DataDownloader, Runtime, SharedBacktestRunner, SharedDataDownloader,
    SharedRuntime,
};
