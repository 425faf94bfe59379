//! Shared data model for the bot runtime.
//!
//! Everything that crosses the runtime contract lives here: workload
//! specifications and statuses, log/update options, data-download tasks
//! and the availability report they emit, and backtest runs. Backends
//! translate their native state into these types; nothing in this crate
//! talks to a container engine.

mod backtest;
mod download;
mod status;
mod workload;

pub use backtest::{BacktestRun, BacktestSpec, BacktestState, BacktestStatus};
pub use download::{
    DataAvailability, DataDownloadSpec, DataDownloadStatus, DownloadState, ExchangeData,
    ExchangeDownload, PairData, TimeframeRange, TradingMode, DATA_REPORT_BEGIN, DATA_REPORT_END,
};
pub use status::{BotState, ResourceUsage, WorkloadStatus};
pub use workload::{ConfigMap, LogOptions, ResourceLimits, UpdateBotSpec, WorkloadSpec};
