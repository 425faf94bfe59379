//! HTTP client for the Docker Engine API.
//!
//! Two layers: [`transport`] owns the reqwest client, TLS setup,
//! version-prefixed URL building and uniform error classification;
//! [`client`] exposes the typed endpoints the backends consume
//! (containers, images, networks, stats, logs). Log payloads come back
//! already demultiplexed from the engine's framed stream.

mod client;
mod error;
mod logs;
mod models;
mod transport;

pub use client::{EngineClient, LogsQuery};
pub use error::EngineError;
pub use logs::demux_log_stream;
pub use models::{
    BlkioEntry, BlkioStats, ContainerConfig, ContainerCreateRequest, ContainerCreateResponse,
    ContainerInspect, ContainerState, ContainerSummary, ContainerUpdateRequest,
    ContainerUpdateResponse, CpuStats, CpuUsage, EmptyObject, EndpointNetwork, HealthState,
    HostConfig, ImageInspect, MemoryStats, NetworkCreateRequest, NetworkCreateResponse,
    NetworkInspect, NetworkSettings, NetworkStats, NetworkingConfig, PortBinding, PullProgress,
    RestartPolicy, StatsSnapshot,
};
pub use transport::{DaemonAddr, EngineTransport};
