//! Normalized status derived from engine state.
//!
//! The one place container state turns into [`BotState`]; every status
//! query goes through [`map_status`] so the mapping stays deterministic
//! across `bot_status`, `list_bots` and the ephemeral task paths.

use chrono::{DateTime, Utc};
use engine_client::{
    ContainerInspect, ContainerState, EngineClient, LogsQuery, NetworkSettings, StatsSnapshot,
};
use model::{BotState, ResourceUsage, WorkloadStatus};

/// Map one inspected container into the normalized workload status.
pub(crate) fn map_status(
    bot_id: &str,
    inspect: &ContainerInspect,
    stats: Option<&StatsSnapshot>,
    network: &str,
) -> WorkloadStatus {
    let state = bot_state(&inspect.state);
    let settings = inspect.network_settings.as_ref();

    WorkloadStatus {
        bot_id: bot_id.to_string(),
        state,
        healthy: state == BotState::Running,
        created_at: parse_engine_time(&inspect.created),
        started_at: inspect.state.started_at.as_deref().and_then(parse_engine_time),
        finished_at: inspect.state.finished_at.as_deref().and_then(parse_engine_time),
        checked_at: Utc::now(),
        error: state_error(&inspect.state),
        ip_address: settings
            .and_then(|settings| settings.container_ip(network))
            .map(str::to_string),
        host_port: settings.and_then(first_host_port),
        resources: stats.map(resource_usage).unwrap_or_default(),
    }
}

/// The state table. Restarting and paused are checked before the
/// running flag because the engine keeps `Running=true` through both.
fn bot_state(state: &ContainerState) -> BotState {
    let probe_ok = state
        .health
        .as_ref()
        .map(|health| health.status == "healthy")
        .unwrap_or(true);

    if state.restarting {
        BotState::Creating
    } else if state.paused {
        BotState::Stopped
    } else if state.running && probe_ok {
        BotState::Running
    } else if state.running {
        BotState::Unhealthy
    } else if state.dead || state.oom_killed {
        BotState::Error
    } else {
        BotState::Stopped
    }
}

/// Failure detail for the status, when the state carries one.
fn state_error(state: &ContainerState) -> Option<String> {
    if let Some(error) = &state.error {
        if !error.is_empty() {
            return Some(error.clone());
        }
    }
    if state.oom_killed {
        return Some("container was OOM-killed".to_string());
    }
    match state.exit_code {
        Some(code) if code != 0 && !state.running => Some(format!("exited with code {}", code)),
        _ => None,
    }
}

/// Engine timestamps are RFC3339; the zero time means "never".
fn parse_engine_time(raw: &str) -> Option<DateTime<Utc>> {
    if raw.is_empty() || raw.starts_with("0001-01-01") {
        return None;
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|time| time.with_timezone(&Utc))
}

/// Host port of the API port. Managed bots expose exactly one port, so
/// the first bound one is it.
pub(crate) fn first_host_port(settings: &NetworkSettings) -> Option<u16> {
    settings
        .ports
        .values()
        .flatten()
        .flatten()
        .find_map(|binding| binding.host_port.parse().ok())
}

/// Container-side API port, from the single exposed port key.
pub(crate) fn api_port(settings: &NetworkSettings) -> Option<u16> {
    settings
        .ports
        .keys()
        .find_map(|key| key.strip_suffix("/tcp").and_then(|port| port.parse().ok()))
}

/// Normalize one stats sample into counters, summing across
/// interfaces and block devices.
pub(crate) fn resource_usage(stats: &StatsSnapshot) -> ResourceUsage {
    let (net_rx_bytes, net_tx_bytes) = stats
        .networks
        .as_ref()
        .map(|networks| {
            networks.values().fold((0, 0), |(rx, tx), iface| {
                (rx + iface.rx_bytes, tx + iface.tx_bytes)
            })
        })
        .unwrap_or((0, 0));

    let (block_read_bytes, block_write_bytes) = stats
        .blkio_stats
        .as_ref()
        .and_then(|blkio| blkio.io_service_bytes_recursive.as_ref())
        .map(|entries| {
            entries.iter().fold((0, 0), |(read, write), entry| {
                if entry.op.eq_ignore_ascii_case("read") {
                    (read + entry.value, write)
                } else if entry.op.eq_ignore_ascii_case("write") {
                    (read, write + entry.value)
                } else {
                    (read, write)
                }
            })
        })
        .unwrap_or((0, 0));

    ResourceUsage {
        cpu_percent: cpu_percent(stats),
        memory_bytes: stats.memory_stats.usage.unwrap_or(0),
        net_rx_bytes,
        net_tx_bytes,
        block_read_bytes,
        block_write_bytes,
    }
}

/// Engine CPU math: the container's share of the system delta, scaled
/// by active cores. Core count falls back from per-CPU counters to
/// `online_cpus` to 1; zero or absent deltas yield 0.0.
fn cpu_percent(stats: &StatsSnapshot) -> f64 {
    let cpu_delta = stats
        .cpu_stats
        .cpu_usage
        .total_usage
        .saturating_sub(stats.precpu_stats.cpu_usage.total_usage);
    let system_delta = stats
        .cpu_stats
        .system_cpu_usage
        .unwrap_or(0)
        .saturating_sub(stats.precpu_stats.system_cpu_usage.unwrap_or(0));
    if cpu_delta == 0 || system_delta == 0 {
        return 0.0;
    }

    let cores = stats
        .cpu_stats
        .cpu_usage
        .percpu_usage
        .as_ref()
        .map(|per_cpu| per_cpu.len() as f64)
        .filter(|count| *count > 0.0)
        .or_else(|| stats.cpu_stats.online_cpus.map(f64::from))
        .filter(|count| *count > 0.0)
        .unwrap_or(1.0);

    (cpu_delta as f64 / system_delta as f64) * cores * 100.0
}

/// Coarse lifecycle phase of an ephemeral task container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TaskPhase {
    Pending,
    Running,
    Completed,
    Failed(i64),
}

impl TaskPhase {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed(_) => "failed",
        }
    }
}

/// Derive a task's phase from its container state.
pub(crate) fn task_phase(state: &ContainerState) -> TaskPhase {
    if state.running || state.restarting {
        TaskPhase::Running
    } else if state.status == "created" {
        TaskPhase::Pending
    } else if state.dead || state.oom_killed {
        TaskPhase::Failed(state.exit_code.unwrap_or(-1))
    } else {
        match state.exit_code {
            Some(0) => TaskPhase::Completed,
            Some(code) => TaskPhase::Failed(code),
            None => TaskPhase::Pending,
        }
    }
}

/// Exit code plus the last few log lines, for error fields on failed
/// tasks.
pub(crate) async fn failure_detail(
    engine: &EngineClient,
    container_id: &str,
    exit_code: i64,
) -> String {
    let query = LogsQuery {
        tail: Some(5),
        ..LogsQuery::default()
    };
    let tail = match engine.container_logs(container_id, &query).await {
        Ok(logs) => logs.trim().to_string(),
        Err(_) => String::new(),
    };

    if tail.is_empty() {
        format!("task exited with code {}", exit_code)
    } else {
        format!("task exited with code {}: {}", exit_code, tail)
    }
}

#[cfg(test)]
mod tests {
    use engine_client::{
        BlkioEntry, BlkioStats, CpuStats, CpuUsage, HealthState, MemoryStats, NetworkStats,
    };

    use super::*;

    fn running_state() -> ContainerState {
        ContainerState {
            status: "running".to_string(),
            running: true,
            started_at: Some("2024-03-01T10:00:01Z".to_string()),
            finished_at: Some("0001-01-01T00:00:00Z".to_string()),
            exit_code: Some(0),
            ..ContainerState::default()
        }
    }

    fn inspect_with(state: ContainerState) -> ContainerInspect {
        let raw = serde_json::json!({
            "Id": "abc123",
            "Name": "/botfleet-alpha-1",
            "Created": "2024-03-01T10:00:00Z",
            "State": {},
            "NetworkSettings": {
                "Ports": {"8080/tcp": [{"HostIp": "0.0.0.0", "HostPort": "49155"}]},
                "Networks": {"botfleet": {"IPAddress": "172.18.0.2"}}
            }
        });
        let mut inspect: ContainerInspect = serde_json::from_value(raw).unwrap();
        inspect.state = state;
        inspect
    }

    #[test]
    fn test_running_and_healthy_maps_to_running() {
        let mut state = running_state();
        state.health = Some(HealthState {
            status: "healthy".to_string(),
        });

        let status = map_status("alpha-1", &inspect_with(state), None, "botfleet");
        assert_eq!(status.state, BotState::Running);
        assert!(status.healthy);
        assert_eq!(status.ip_address.as_deref(), Some("172.18.0.2"));
        assert_eq!(status.host_port, Some(49155));
        assert!(status.started_at.is_some());
        assert!(status.finished_at.is_none());
        assert!(status.error.is_none());
    }

    #[test]
    fn test_running_but_failing_probe_maps_to_unhealthy() {
        let mut state = running_state();
        state.health = Some(HealthState {
            status: "unhealthy".to_string(),
        });

        let status = map_status("alpha-1", &inspect_with(state), None, "botfleet");
        assert_eq!(status.state, BotState::Unhealthy);
        assert!(!status.healthy);
    }

    #[test]
    fn test_no_probe_counts_as_healthy() {
        let status = map_status("alpha-1", &inspect_with(running_state()), None, "botfleet");
        assert_eq!(status.state, BotState::Running);
        assert!(status.healthy);
    }

    #[test]
    fn test_restarting_maps_to_creating() {
        let mut state = running_state();
        state.status = "restarting".to_string();
        state.restarting = true;

        let status = map_status("alpha-1", &inspect_with(state), None, "botfleet");
        assert_eq!(status.state, BotState::Creating);
        assert!(!status.healthy);
    }

    #[test]
    fn test_paused_maps_to_stopped() {
        let mut state = running_state();
        state.status = "paused".to_string();
        state.paused = true;

        let status = map_status("alpha-1", &inspect_with(state), None, "botfleet");
        assert_eq!(status.state, BotState::Stopped);
    }

    #[test]
    fn test_oom_kill_maps_to_error_with_message() {
        let state = ContainerState {
            status: "exited".to_string(),
            oom_killed: true,
            exit_code: Some(137),
            ..ContainerState::default()
        };

        let status = map_status("alpha-1", &inspect_with(state), None, "botfleet");
        assert_eq!(status.state, BotState::Error);
        assert!(status.error.unwrap().contains("OOM"));
    }

    #[test]
    fn test_plain_nonzero_exit_is_stopped_with_detail() {
        let state = ContainerState {
            status: "exited".to_string(),
            exit_code: Some(2),
            ..ContainerState::default()
        };

        let status = map_status("alpha-1", &inspect_with(state), None, "botfleet");
        assert_eq!(status.state, BotState::Stopped);
        assert_eq!(status.error.as_deref(), Some("exited with code 2"));
    }

    #[test]
    fn test_task_phase_table() {
        let created = ContainerState {
            status: "created".to_string(),
            ..ContainerState::default()
        };
        assert_eq!(task_phase(&created), TaskPhase::Pending);

        assert_eq!(task_phase(&running_state()), TaskPhase::Running);

        let done = ContainerState {
            status: "exited".to_string(),
            exit_code: Some(0),
            ..ContainerState::default()
        };
        assert_eq!(task_phase(&done), TaskPhase::Completed);

        let failed = ContainerState {
            status: "exited".to_string(),
            exit_code: Some(3),
            ..ContainerState::default()
        };
        assert_eq!(task_phase(&failed), TaskPhase::Failed(3));
    }

    fn stats(percpu: Option<Vec<u64>>, online: Option<u32>) -> StatsSnapshot {
        StatsSnapshot {
            cpu_stats: CpuStats {
                cpu_usage: CpuUsage {
                    total_usage: 1_200,
                    percpu_usage: percpu,
                },
                system_cpu_usage: Some(11_000),
                online_cpus: online,
            },
            precpu_stats: CpuStats {
                cpu_usage: CpuUsage {
                    total_usage: 1_000,
                    percpu_usage: None,
                },
                system_cpu_usage: Some(10_000),
                online_cpus: None,
            },
            ..StatsSnapshot::default()
        }
    }

    #[test]
    fn test_cpu_percent_uses_percpu_count() {
        // container delta 200, system delta 1000, 4 cores: 80%.
        let usage = resource_usage(&stats(Some(vec![1, 2, 3, 4]), None));
        assert!((usage.cpu_percent - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_cpu_percent_falls_back_to_online_cpus_then_one() {
        let usage = resource_usage(&stats(None, Some(2)));
        assert!((usage.cpu_percent - 40.0).abs() < 1e-9);

        let usage = resource_usage(&stats(None, None));
        assert!((usage.cpu_percent - 20.0).abs() < 1e-9);

        // An empty per-CPU list must not yield a zero multiplier.
        let usage = resource_usage(&stats(Some(Vec::new()), None));
        assert!((usage.cpu_percent - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_deltas_never_divide() {
        let mut sample = stats(None, None);
        sample.cpu_stats.system_cpu_usage = sample.precpu_stats.system_cpu_usage;
        assert_eq!(resource_usage(&sample).cpu_percent, 0.0);

        let mut sample = stats(None, None);
        sample.cpu_stats.cpu_usage.total_usage = sample.precpu_stats.cpu_usage.total_usage;
        assert_eq!(resource_usage(&sample).cpu_percent, 0.0);
    }

    #[test]
    fn test_network_and_block_io_are_summed() {
        let mut sample = stats(None, None);
        sample.memory_stats = MemoryStats {
            usage: Some(52_428_800),
        };
        sample.networks = Some(
            [
                (
                    "eth0".to_string(),
                    NetworkStats {
                        rx_bytes: 100,
                        tx_bytes: 10,
                    },
                ),
                (
                    "eth1".to_string(),
                    NetworkStats {
                        rx_bytes: 50,
                        tx_bytes: 5,
                    },
                ),
            ]
            .into_iter()
            .collect(),
        );
        sample.blkio_stats = Some(BlkioStats {
            io_service_bytes_recursive: Some(vec![
                BlkioEntry {
                    op: "Read".to_string(),
                    value: 4_096,
                },
                BlkioEntry {
                    op: "write".to_string(),
                    value: 8_192,
                },
                BlkioEntry {
                    op: "Total".to_string(),
                    value: 12_288,
                },
            ]),
        });

        let usage = resource_usage(&sample);
        assert_eq!(usage.memory_bytes, 52_428_800);
        assert_eq!(usage.net_rx_bytes, 150);
        assert_eq!(usage.net_tx_bytes, 15);
        assert_eq!(usage.block_read_bytes, 4_096);
        assert_eq!(usage.block_write_bytes, 8_192);
    }

    #[test]
    fn test_zero_time_parses_to_none() {
        assert!(parse_engine_time("0001-01-01T00:00:00Z").is_none());
        assert!(parse_engine_time("").is_none());
        assert!(parse_engine_time("2024-03-01T10:00:00.000000000Z").is_some());
    }

    #[test]
    fn test_api_port_read_from_exposed_key() {
        let settings: NetworkSettings = serde_json::from_str(
            r#"{"Ports": {"8080/tcp": null}, "Networks": {}, "IPAddress": ""}"#,
        )
        .unwrap();
        assert_eq!(api_port(&settings), Some(8080));
        assert_eq!(first_host_port(&settings), None);
    }
}
