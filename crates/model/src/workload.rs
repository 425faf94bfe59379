//! Workload specification and request options.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// An ordered JSON object used for layered bot configuration.
///
/// Layers merge last-wins: exchange, then strategy, then workload, then
/// the system-forced secure layer. The alias relies on `serde_json`'s
/// `preserve_order` feature so key order survives a round trip.
pub type ConfigMap = serde_json::Map<String, serde_json::Value>;

/// Specification for one managed trading-bot workload.
///
/// Immutable once submitted to `create_bot`; changes go through
/// [`UpdateBotSpec`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadSpec {
    /// Unique workload identifier. Container names, labels and config
    /// file paths are all namespaced by this value.
    pub bot_id: String,
    /// Human-readable display name.
    pub name: String,
    /// Image reference, e.g. `registry.example.com/trader:1.4`.
    pub image: String,
    /// Strategy name as supplied by the tenant. Sanitized before it
    /// becomes a filename.
    pub strategy_name: String,
    /// Strategy source code, written into the workload's `strategies/`
    /// directory at creation time.
    pub strategy_source: String,
    /// Exchange-level configuration layer (lowest precedence).
    #[serde(default)]
    pub exchange_config: ConfigMap,
    /// Strategy-level configuration layer.
    #[serde(default)]
    pub strategy_config: ConfigMap,
    /// Workload-level configuration layer.
    #[serde(default)]
    pub bot_config: ConfigMap,
    /// Container resource limits.
    #[serde(default)]
    pub resources: ResourceLimits,
    /// Container network mode override. `None` uses the backend's
    /// managed bridge network.
    #[serde(default)]
    pub network_mode: Option<String>,
    /// Port the bot's API server listens on inside the container.
    pub api_port: u16,
    /// Extra environment variables, applied after the backend's own.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Optional URL of a historical-data bundle fetched and unpacked
    /// before the trading process starts.
    #[serde(default)]
    pub data_download_url: Option<String>,
}

/// Container resource limits.
///
/// `None` fields leave the engine default (unlimited) in place.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Memory limit in bytes.
    #[serde(default)]
    pub memory_bytes: Option<u64>,
    /// CPU quota in microseconds per period.
    #[serde(default)]
    pub cpu_quota: Option<i64>,
    /// CPU period in microseconds.
    #[serde(default)]
    pub cpu_period: Option<i64>,
}

impl ResourceLimits {
    /// Returns true when no limit is set.
    pub fn is_empty(&self) -> bool {
        self.memory_bytes.is_none() && self.cpu_quota.is_none() && self.cpu_period.is_none()
    }
}

/// Options for a log retrieval call.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LogOptions {
    /// Only return this many lines from the end of the log.
    #[serde(default)]
    pub tail: Option<u32>,
    /// Only return entries after this unix timestamp (seconds).
    #[serde(default)]
    pub since: Option<i64>,
    /// Prefix each line with its timestamp.
    #[serde(default)]
    pub timestamps: bool,
}

impl LogOptions {
    /// Tail the last `n` lines.
    pub fn tail(n: u32) -> Self {
        Self {
            tail: Some(n),
            ..Self::default()
        }
    }
}

/// Mutable subset of a workload applied by `update_bot`.
///
/// Config layers that are `None` are left untouched; supplied layers are
/// rewritten in full. Resource changes apply to the live container.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateBotSpec {
    /// New resource limits, if changing.
    #[serde(default)]
    pub resources: Option<ResourceLimits>,
    /// Replacement exchange config layer.
    #[serde(default)]
    pub exchange_config: Option<ConfigMap>,
    /// Replacement strategy config layer.
    #[serde(default)]
    pub strategy_config: Option<ConfigMap>,
    /// Replacement workload config layer.
    #[serde(default)]
    pub bot_config: Option<ConfigMap>,
    /// Restart the container so rewritten config takes effect.
    #[serde(default)]
    pub restart: bool,
}

impl UpdateBotSpec {
    /// Returns true when the update rewrites at least one config layer.
    pub fn touches_config(&self) -> bool {
        self.exchange_config.is_some()
            || self.strategy_config.is_some()
            || self.bot_config.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_round_trip_with_defaults() {
        let json = r#"{
            "bot_id": "b1",
            "name": "alpha",
            "image": "trader:latest",
            "strategy_name": "RSI Test Strategy",
            "strategy_source": "class Rsi: pass",
            "api_port": 8080
        }"#;

        let spec: WorkloadSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.bot_id, "b1");
        assert!(spec.exchange_config.is_empty());
        assert!(spec.resources.is_empty());
        assert!(spec.env.is_empty());
        assert!(spec.data_download_url.is_none());

        let back = serde_json::to_string(&spec).unwrap();
        let again: WorkloadSpec = serde_json::from_str(&back).unwrap();
        assert_eq!(again.api_port, 8080);
    }

    #[test]
    fn test_update_touches_config() {
        let mut update = UpdateBotSpec::default();
        assert!(!update.touches_config());

        update.strategy_config = Some(ConfigMap::new());
        assert!(update.touches_config());
    }
}
