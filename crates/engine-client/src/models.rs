//! Engine API request and response types.
//!
//! Field names follow the engine's JSON conventions: PascalCase for
//! container/network/image endpoints, snake_case for the stats
//! endpoint. Unknown fields are ignored so minor daemon-version drift
//! does not break deserialization.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Serializes as `{}`, for map values the engine wants empty.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EmptyObject {}

// ============================================================================
// Container requests
// ============================================================================

/// Body for POST /containers/create.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerCreateRequest {
    pub image: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cmd: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub exposed_ports: BTreeMap<String, EmptyObject>,
    pub host_config: HostConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub networking_config: Option<NetworkingConfig>,
}

/// Host-side settings of a container create request.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostConfig {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub binds: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub port_bindings: BTreeMap<String, Vec<PortBinding>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_quota: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_period: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart_policy: Option<RestartPolicy>,
}

/// One host port binding. `host_port` empty means "pick an ephemeral
/// port".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PortBinding {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_ip: Option<String>,
    #[serde(default)]
    pub host_port: String,
}

/// Container restart policy.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RestartPolicy {
    pub name: String,
}

impl RestartPolicy {
    /// Restart unless explicitly stopped by the operator.
    pub fn unless_stopped() -> Self {
        Self {
            name: "unless-stopped".to_string(),
        }
    }

    /// Never restart; used for one-shot task containers.
    pub fn no() -> Self {
        Self {
            name: "no".to_string(),
        }
    }
}

/// Network attachment section of a create request.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkingConfig {
    pub endpoints_config: BTreeMap<String, EmptyObject>,
}

/// Body for POST /containers/{id}/update.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerUpdateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_swap: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_quota: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_period: Option<i64>,
}

// ============================================================================
// Container responses
// ============================================================================

/// Response from POST /containers/create.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerCreateResponse {
    pub id: String,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Response from GET /containers/{id}/json.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerInspect {
    pub id: String,
    /// Name as reported by the engine, with a leading slash.
    #[serde(default)]
    pub name: String,
    /// RFC3339 creation time.
    #[serde(default)]
    pub created: String,
    pub state: ContainerState,
    pub config: Option<ContainerConfig>,
    pub network_settings: Option<NetworkSettings>,
}

impl ContainerInspect {
    /// Container name without the engine's leading slash.
    pub fn plain_name(&self) -> &str {
        self.name.trim_start_matches('/')
    }

    /// Label value, if present.
    pub fn label(&self, key: &str) -> Option<&str> {
        self.config
            .as_ref()
            .and_then(|config| config.labels.get(key))
            .map(String::as_str)
    }
}

/// State section of a container inspect response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerState {
    /// One of created, running, paused, restarting, removing, exited,
    /// dead.
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub restarting: bool,
    #[serde(default, rename = "OOMKilled")]
    pub oom_killed: bool,
    #[serde(default)]
    pub dead: bool,
    pub exit_code: Option<i64>,
    pub error: Option<String>,
    /// RFC3339, or the engine's zero time when never started.
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub health: Option<HealthState>,
}

/// Health-probe section of a container state.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HealthState {
    /// One of starting, healthy, unhealthy, none.
    #[serde(default)]
    pub status: String,
}

/// Config section of a container inspect response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerConfig {
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// Network section of a container inspect response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkSettings {
    /// Port-to-host bindings; the engine reports unbound ports as null.
    #[serde(default)]
    pub ports: BTreeMap<String, Option<Vec<PortBinding>>>,
    /// Per-network endpoint details.
    #[serde(default)]
    pub networks: BTreeMap<String, EndpointNetwork>,
    /// Legacy top-level address, populated on the default bridge.
    #[serde(default, rename = "IPAddress")]
    pub ip_address: String,
}

impl NetworkSettings {
    /// First non-empty container address across attached networks,
    /// preferring `network` when attached to it.
    pub fn container_ip(&self, network: &str) -> Option<&str> {
        if let Some(endpoint) = self.networks.get(network) {
            if !endpoint.ip_address.is_empty() {
                return Some(&endpoint.ip_address);
            }
        }
        if !self.ip_address.is_empty() {
            return Some(&self.ip_address);
        }
        self.networks
            .values()
            .map(|endpoint| endpoint.ip_address.as_str())
            .find(|ip| !ip.is_empty())
    }

    /// Host port bound to `port/tcp`, if any.
    pub fn host_port_for(&self, port: u16) -> Option<u16> {
        let key = format!("{}/tcp", port);
        self.ports
            .get(&key)
            .and_then(|bindings| bindings.as_ref())
            .and_then(|bindings| {
                bindings
                    .iter()
                    .find_map(|binding| binding.host_port.parse::<u16>().ok())
            })
    }
}

/// One network endpoint of a container.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EndpointNetwork {
    #[serde(default, rename = "IPAddress")]
    pub ip_address: String,
}

/// One entry of GET /containers/json.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerSummary {
    pub id: String,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub image: String,
    /// Coarse state string, e.g. "running" or "exited".
    #[serde(default)]
    pub state: String,
    /// Human status line, e.g. "Up 2 minutes".
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// Response from POST /containers/{id}/update.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerUpdateResponse {
    #[serde(default)]
    pub warnings: Vec<String>,
}

// ============================================================================
// Stats (snake_case endpoint)
// ============================================================================

/// One sample from GET /containers/{id}/stats?stream=false.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatsSnapshot {
    #[serde(default)]
    pub cpu_stats: CpuStats,
    #[serde(default)]
    pub precpu_stats: CpuStats,
    #[serde(default)]
    pub memory_stats: MemoryStats,
    pub networks: Option<BTreeMap<String, NetworkStats>>,
    pub blkio_stats: Option<BlkioStats>,
}

/// CPU section of a stats sample.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CpuStats {
    #[serde(default)]
    pub cpu_usage: CpuUsage,
    pub system_cpu_usage: Option<u64>,
    pub online_cpus: Option<u32>,
}

/// Cumulative CPU counters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CpuUsage {
    #[serde(default)]
    pub total_usage: u64,
    pub percpu_usage: Option<Vec<u64>>,
}

/// Memory section of a stats sample.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemoryStats {
    pub usage: Option<u64>,
}

/// Per-interface network counters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NetworkStats {
    #[serde(default)]
    pub rx_bytes: u64,
    #[serde(default)]
    pub tx_bytes: u64,
}

/// Block I/O section of a stats sample.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlkioStats {
    pub io_service_bytes_recursive: Option<Vec<BlkioEntry>>,
}

/// One per-device block I/O counter.
#[derive(Debug, Clone, Deserialize)]
pub struct BlkioEntry {
    #[serde(default)]
    pub op: String,
    #[serde(default)]
    pub value: u64,
}

// ============================================================================
// Networks
// ============================================================================

/// Body for POST /networks/create.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkCreateRequest {
    pub name: String,
    pub driver: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// Response from POST /networks/create.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkCreateResponse {
    pub id: String,
    #[serde(default)]
    pub warning: String,
}

/// Response from GET /networks/{name}.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkInspect {
    pub id: String,
    pub name: String,
}

// ============================================================================
// Images
// ============================================================================

/// Response from GET /images/{name}/json.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageInspect {
    pub id: String,
}

/// One line of the image pull progress stream.
#[derive(Debug, Clone, Deserialize)]
pub struct PullProgress {
    pub status: Option<String>,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_omits_absent_fields() {
        let request = ContainerCreateRequest {
            image: "trader:latest".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["Image"], "trader:latest");
        assert!(json.get("Cmd").is_none());
        assert!(json.get("Entrypoint").is_none());
        assert!(json.get("Env").is_none());
        // HostConfig is always present, even when empty.
        assert!(json.get("HostConfig").is_some());
    }

    #[test]
    fn test_port_binding_wire_names() {
        let binding = PortBinding {
            host_ip: Some("0.0.0.0".to_string()),
            host_port: String::new(),
        };
        let json = serde_json::to_value(&binding).unwrap();
        assert_eq!(json["HostIp"], "0.0.0.0");
        assert_eq!(json["HostPort"], "");
    }

    #[test]
    fn test_inspect_parses_engine_shape() {
        let raw = r#"{
            "Id": "abc123",
            "Name": "/botfleet-alpha",
            "Created": "2024-03-01T10:00:00.000000000Z",
            "State": {
                "Status": "running",
                "Running": true,
                "Paused": false,
                "Restarting": false,
                "OOMKilled": false,
                "Dead": false,
                "ExitCode": 0,
                "StartedAt": "2024-03-01T10:00:01Z",
                "FinishedAt": "0001-01-01T00:00:00Z",
                "Health": {"Status": "healthy"}
            },
            "Config": {
                "Image": "trader:latest",
                "Labels": {"botfleet.bot.id": "alpha"}
            },
            "NetworkSettings": {
                "Ports": {"8080/tcp": [{"HostIp": "0.0.0.0", "HostPort": "49155"}], "9090/tcp": null},
                "Networks": {"botfleet": {"IPAddress": "172.18.0.2"}},
                "IPAddress": ""
            }
        }"#;

        let inspect: ContainerInspect = serde_json::from_str(raw).unwrap();
        assert_eq!(inspect.plain_name(), "botfleet-alpha");
        assert_eq!(inspect.label("botfleet.bot.id"), Some("alpha"));
        assert!(inspect.state.running);
        assert!(!inspect.state.oom_killed);

        let settings = inspect.network_settings.unwrap();
        assert_eq!(settings.container_ip("botfleet"), Some("172.18.0.2"));
        assert_eq!(settings.host_port_for(8080), Some(49155));
        assert_eq!(settings.host_port_for(9090), None);
    }

    #[test]
    fn test_container_ip_falls_back_across_networks() {
        let raw = r#"{
            "Ports": {},
            "Networks": {"other": {"IPAddress": "10.1.0.9"}},
            "IPAddress": ""
        }"#;
        let settings: NetworkSettings = serde_json::from_str(raw).unwrap();
        assert_eq!(settings.container_ip("botfleet"), Some("10.1.0.9"));
    }

    #[test]
    fn test_stats_parse_with_missing_sections() {
        let raw = r#"{
            "cpu_stats": {"cpu_usage": {"total_usage": 1000}, "online_cpus": 4},
            "precpu_stats": {"cpu_usage": {"total_usage": 0}},
            "memory_stats": {"usage": 52428800}
        }"#;
        let stats: StatsSnapshot = serde_json::from_str(raw).unwrap();
        assert_eq!(stats.cpu_stats.cpu_usage.total_usage, 1000);
        assert_eq!(stats.memory_stats.usage, Some(52428800));
        assert!(stats.networks.is_none());
        assert!(stats.blkio_stats.is_none());
    }
}
