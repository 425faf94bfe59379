//! Normalized workload status and resource telemetry.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Normalized workload state.
///
/// Every backend maps its native container state into exactly one of
/// these values; callers never see engine-specific strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotState {
    /// Provisioning or restarting; not yet serving.
    Creating,
    /// Running and passing its health probe (or no probe configured).
    Running,
    /// Running but failing its health probe.
    Unhealthy,
    /// Not running: exited, paused, or never started.
    Stopped,
    /// Dead, OOM-killed, or otherwise unrecoverable without recreation.
    Error,
}

impl BotState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Creating => "creating",
            Self::Running => "running",
            Self::Unhealthy => "unhealthy",
            Self::Stopped => "stopped",
            Self::Error => "error",
        }
    }

    /// Whether the workload process is up, healthy or not.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Unhealthy)
    }
}

impl fmt::Display for BotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One resource-usage snapshot, normalized from engine counters.
///
/// Empty (all zeros) when stats collection failed; telemetry is
/// best-effort and never fails a status call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    /// CPU usage as a percentage of one core (can exceed 100 on
    /// multi-core workloads).
    pub cpu_percent: f64,
    /// Resident memory in bytes.
    pub memory_bytes: u64,
    /// Bytes received, summed across all interfaces.
    pub net_rx_bytes: u64,
    /// Bytes transmitted, summed across all interfaces.
    pub net_tx_bytes: u64,
    /// Bytes read from block devices, summed.
    pub block_read_bytes: u64,
    /// Bytes written to block devices, summed.
    pub block_write_bytes: u64,
}

impl ResourceUsage {
    /// Returns true when no counter carries data.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Point-in-time status of one workload.
///
/// Recomputed from the backend on every query; this subsystem never
/// caches or persists it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadStatus {
    /// Workload identifier.
    pub bot_id: String,
    /// Normalized state.
    pub state: BotState,
    /// True only when running and passing any configured health probe.
    pub healthy: bool,
    /// When the container was created.
    pub created_at: Option<DateTime<Utc>>,
    /// When the container last started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the container last stopped, if it has.
    pub finished_at: Option<DateTime<Utc>>,
    /// When this snapshot was taken.
    pub checked_at: DateTime<Utc>,
    /// Backend-reported error detail, populated for `Error` states.
    pub error: Option<String>,
    /// Workload address on the managed network.
    pub ip_address: Option<String>,
    /// Host port mapped to the workload's API port.
    pub host_port: Option<u16>,
    /// Resource snapshot; empty when stats were unavailable.
    pub resources: ResourceUsage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_serde_lowercase() {
        assert_eq!(serde_json::to_string(&BotState::Unhealthy).unwrap(), "\"unhealthy\"");
        let state: BotState = serde_json::from_str("\"running\"").unwrap();
        assert_eq!(state, BotState::Running);
    }

    #[test]
    fn test_state_activity() {
        assert!(BotState::Running.is_active());
        assert!(BotState::Unhealthy.is_active());
        assert!(!BotState::Stopped.is_active());
        assert!(!BotState::Error.is_active());
        assert!(!BotState::Creating.is_active());
    }

    #[test]
    fn test_empty_usage() {
        assert!(ResourceUsage::default().is_empty());
        let usage = ResourceUsage {
            cpu_percent: 1.5,
            ..ResourceUsage::default()
        };
        assert!(!usage.is_empty());
    }
}
