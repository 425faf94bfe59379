//! Historical-data download tasks and the availability report.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Marker line printed before the availability report in the download
/// container's stdout.
pub const DATA_REPORT_BEGIN: &str = "-----BEGIN AVAILABLE DATA-----";
/// Marker line printed after the availability report.
pub const DATA_REPORT_END: &str = "-----END AVAILABLE DATA-----";

/// Market type a download targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    Spot,
    Futures,
}

impl TradingMode {
    /// Value passed to the download command's `--trading-mode` flag.
    pub fn as_arg(&self) -> &'static str {
        match self {
            Self::Spot => "spot",
            Self::Futures => "futures",
        }
    }
}

impl fmt::Display for TradingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_arg())
    }
}

/// One exchange's slice of a download task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeDownload {
    /// Exchange name, e.g. `binance`.
    pub exchange: String,
    /// Candle timeframes to fetch, e.g. `["5m", "1h"]`.
    pub timeframes: Vec<String>,
    /// Pair pattern, e.g. `.*/USDT`.
    pub pair_pattern: String,
    /// How many days back to fetch.
    pub days: u32,
    /// Spot or futures market.
    pub trading_mode: TradingMode,
}

/// A bulk historical-data download task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataDownloadSpec {
    /// Exchanges to refresh, each with its own pairs and timeframes.
    pub exchanges: Vec<ExchangeDownload>,
    /// Image to run; must ship the trading toolchain.
    pub image: String,
    /// Pre-signed URL the finished archive is PUT to.
    pub upload_url: String,
    /// Optional URL of a previous bundle, fetched best-effort so the
    /// download is incremental. A cold start is valid.
    #[serde(default)]
    pub prior_data_url: Option<String>,
}

/// Lifecycle state of a download task, derived from its container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadState {
    Pending,
    Downloading,
    Completed,
    Failed,
}

impl DownloadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Downloading => "downloading",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether the task can still make progress.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for DownloadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time status of a download task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataDownloadStatus {
    /// Backend-assigned task identifier.
    pub task_id: String,
    pub state: DownloadState,
    /// Fraction of exchanges finished, 0.0..=1.0.
    pub progress: f32,
    /// Failure detail when `state` is `Failed`.
    pub error: Option<String>,
}

/// Report of what data a finished download produced, derived from the
/// files on disk rather than the request that created them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataAvailability {
    pub exchanges: Vec<ExchangeData>,
}

/// Available data for one exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeData {
    pub name: String,
    pub pairs: Vec<PairData>,
}

/// Available data for one trading pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairData {
    pub pair: String,
    pub timeframes: Vec<TimeframeRange>,
}

/// Inclusive date range covered by one timeframe's file, read from the
/// file's first and last records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeframeRange {
    pub timeframe: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
}
