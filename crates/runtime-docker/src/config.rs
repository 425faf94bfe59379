//! Backend configuration.

use std::time::Duration;

use auth::{RegistryCredentials, TlsMaterial};
use engine_client::DaemonAddr;
use runtime_core::{BackendConfig, RuntimeError};
use serde::{Deserialize, Serialize};

/// Engine API version every request is pinned to unless overridden.
pub const DEFAULT_API_VERSION: &str = "v1.43";

/// Default bridge network managed bots attach to.
pub const DEFAULT_NETWORK: &str = "botfleet";

const DEFAULT_PROBE_TIMEOUT_MS: u64 = 750;
const DEFAULT_STOP_TIMEOUT_SECS: u32 = 10;

/// Configuration for the Docker backend.
///
/// Parsed from the raw backend map the registry hands every factory,
/// validated before any client is built, and lossless through a JSON
/// map round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DockerConfig {
    /// Daemon address: `tcp://host:port`, `http(s)://host[:port]` or
    /// `unix:///path`.
    pub host: String,

    /// Mutual-TLS material for remote daemons, as PEM content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsMaterial>,

    /// Engine API version pin.
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Bridge network managed bots attach to. Created on demand.
    #[serde(default = "default_network")]
    pub network: String,

    /// Root of the shared writable volume, the same absolute path for
    /// this process and inside bot containers.
    pub base_dir: String,

    /// Mount source for the shared volume: a host path or a named
    /// volume. Defaults to binding `base_dir` itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_source: Option<String>,

    /// Read-only historical dataset volume mounted into backtest runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_volume: Option<String>,

    /// Credentials for pulling images from a private registry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_auth: Option<RegistryCredentials>,

    /// TCP probe budget when trying a bot's own container address.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Grace period a container gets to stop before the engine kills
    /// it.
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u32,
}

impl DockerConfig {
    /// Parse a raw backend map.
    pub fn from_map(config: &BackendConfig) -> Result<Self, RuntimeError> {
        serde_json::from_value(serde_json::Value::Object(config.clone()))
            .map_err(|err| RuntimeError::invalid_config("parse_backend_config", err.to_string()))
    }

    /// Serialize back into the registry's raw map shape.
    pub fn to_map(&self) -> BackendConfig {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => BackendConfig::new(),
        }
    }

    /// Validate everything construction relies on.
    pub fn validate(&self) -> Result<(), RuntimeError> {
        const OP: &str = "validate_backend_config";

        self.daemon_addr()?;
        if self.api_version.trim().is_empty() {
            return Err(RuntimeError::invalid_config(OP, "api_version must not be empty"));
        }
        if self.network.trim().is_empty() {
            return Err(RuntimeError::invalid_config(OP, "network must not be empty"));
        }
        if !self.base_dir.starts_with('/') {
            return Err(RuntimeError::invalid_config(
                OP,
                format!("base_dir must be an absolute path, got {:?}", self.base_dir),
            ));
        }
        if let Some(source) = &self.volume_source {
            if source.trim().is_empty() {
                return Err(RuntimeError::invalid_config(OP, "volume_source must not be empty"));
            }
        }
        if let Some(volume) = &self.data_volume {
            if volume.trim().is_empty() {
                return Err(RuntimeError::invalid_config(OP, "data_volume must not be empty"));
            }
        }
        if self.probe_timeout_ms == 0 {
            return Err(RuntimeError::invalid_config(OP, "probe_timeout_ms must be positive"));
        }
        Ok(())
    }

    /// The parsed daemon address.
    pub fn daemon_addr(&self) -> Result<DaemonAddr, RuntimeError> {
        DaemonAddr::parse(&self.host).map_err(|err| {
            RuntimeError::invalid_config(
                "validate_backend_config",
                format!("bad daemon host: {}", err),
            )
        })
    }

    /// Effective mount source of the shared volume.
    pub fn mount_source(&self) -> &str {
        self.volume_source.as_deref().unwrap_or(&self.base_dir)
    }

    /// Probe budget as a duration.
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

fn default_network() -> String {
    DEFAULT_NETWORK.to_string()
}

fn default_probe_timeout_ms() -> u64 {
    DEFAULT_PROBE_TIMEOUT_MS
}

fn default_stop_timeout_secs() -> u32 {
    DEFAULT_STOP_TIMEOUT_SECS
}
