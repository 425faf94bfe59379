//! Isolated backtest runs.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::workload::ConfigMap;

/// Specification for one backtest run.
///
/// The runner assigns the run id; callers get it back in
/// [`BacktestRun`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestSpec {
    /// Strategy name; sanitized into the source filename.
    pub strategy_name: String,
    /// Strategy source code.
    pub strategy_source: String,
    /// Image to run; must ship the trading toolchain.
    pub image: String,
    /// Exchange config layer (pairs, fees, market settings).
    #[serde(default)]
    pub exchange_config: ConfigMap,
    /// Strategy config layer.
    #[serde(default)]
    pub strategy_config: ConfigMap,
    /// Optional time range, e.g. `20240101-20240401`.
    #[serde(default)]
    pub timerange: Option<String>,
}

/// Handle to a started backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestRun {
    /// Runner-assigned run identifier.
    pub run_id: String,
    /// Backend container id executing the run.
    pub container_id: String,
    /// Isolated workspace path on the shared volume.
    pub workspace: String,
}

/// Lifecycle state of a backtest run, derived from its container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BacktestState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl BacktestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for BacktestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time status of a backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestStatus {
    pub run_id: String,
    pub state: BacktestState,
    /// Exit code once the run has finished.
    pub exit_code: Option<i64>,
    /// Failure detail when `state` is `Failed`.
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backtest_state_terminal() {
        assert!(BacktestState::Completed.is_terminal());
        assert!(BacktestState::Failed.is_terminal());
        assert!(!BacktestState::Running.is_terminal());
    }

    #[test]
    fn test_spec_defaults() {
        let json = r#"{
            "strategy_name": "Breakout",
            "strategy_source": "class Breakout: pass",
            "image": "trader:latest"
        }"#;
        let spec: BacktestSpec = serde_json::from_str(json).unwrap();
        assert!(spec.exchange_config.is_empty());
        assert!(spec.timerange.is_none());
    }
}
