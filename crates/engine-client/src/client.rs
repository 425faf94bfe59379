//! Typed client for the container engine API.

use auth::TlsMaterial;

use crate::error::EngineError;
use crate::logs::demux_log_stream;
use crate::models::{
    ContainerCreateRequest, ContainerCreateResponse, ContainerInspect, ContainerSummary,
    ContainerUpdateRequest, ContainerUpdateResponse, ImageInspect, NetworkCreateRequest,
    NetworkCreateResponse, NetworkInspect, PullProgress, StatsSnapshot,
};
use crate::transport::{DaemonAddr, EngineTransport};

/// Log-fetch parameters for [`EngineClient::container_logs`].
#[derive(Debug, Clone, Default)]
pub struct LogsQuery {
    /// Last N lines only; `None` fetches everything.
    pub tail: Option<u32>,
    /// Unix timestamp lower bound.
    pub since: Option<i64>,
    /// Prefix each line with its timestamp.
    pub timestamps: bool,
}

/// Client for one engine daemon.
///
/// Cheap to clone; all clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct EngineClient {
    transport: EngineTransport,
    daemon_host: String,
}

impl EngineClient {
    /// Build a client for the daemon at `addr`.
    pub fn new(
        addr: &DaemonAddr,
        tls: Option<&TlsMaterial>,
        api_version: &str,
    ) -> Result<Self, EngineError> {
        let transport = EngineTransport::new(addr, tls, api_version)?;
        Ok(Self {
            transport,
            daemon_host: addr.api_host(),
        })
    }

    /// Host half of the daemon address, for building URLs that reach
    /// host-mapped container ports.
    pub fn daemon_host(&self) -> &str {
        &self.daemon_host
    }

    /// Verify the daemon answers.
    ///
    /// GET /_ping
    pub async fn ping(&self) -> Result<(), EngineError> {
        let url = self.transport.url("/_ping");
        self.transport.get_bytes(&url).await.map(|_| ())
    }

    // ========================================================================
    // Containers
    // ========================================================================

    /// Create a named container.
    ///
    /// POST /containers/create
    pub async fn create_container(
        &self,
        name: &str,
        request: &ContainerCreateRequest,
    ) -> Result<ContainerCreateResponse, EngineError> {
        tracing::debug!(name = %name, image = %request.image, "creating container");
        let url = self.transport.url_with("/containers/create", &[("name", name)])?;
        let response: ContainerCreateResponse = self.transport.post_json(&url, request).await?;
        for warning in &response.warnings {
            tracing::warn!(name = %name, warning = %warning, "engine warning on create");
        }
        Ok(response)
    }

    /// Inspect a container by id or name.
    ///
    /// GET /containers/{id}/json
    pub async fn inspect_container(&self, id_or_name: &str) -> Result<ContainerInspect, EngineError> {
        let url = self
            .transport
            .url(&format!("/containers/{}/json", id_or_name));
        self.transport.get_json(&url).await
    }

    /// Start a container. Already-running counts as success.
    ///
    /// POST /containers/{id}/start
    pub async fn start_container(&self, id: &str) -> Result<(), EngineError> {
        let url = self.transport.url(&format!("/containers/{}/start", id));
        self.transport.post_empty(&url).await
    }

    /// Stop a container, giving it `timeout_secs` before the kill.
    /// Already-stopped counts as success.
    ///
    /// POST /containers/{id}/stop
    pub async fn stop_container(&self, id: &str, timeout_secs: u32) -> Result<(), EngineError> {
        let url = self
            .transport
            .url(&format!("/containers/{}/stop?t={}", id, timeout_secs));
        self.transport.post_empty(&url).await
    }

    /// Restart a container.
    ///
    /// POST /containers/{id}/restart
    pub async fn restart_container(&self, id: &str, timeout_secs: u32) -> Result<(), EngineError> {
        let url = self
            .transport
            .url(&format!("/containers/{}/restart?t={}", id, timeout_secs));
        self.transport.post_empty(&url).await
    }

    /// Remove a container and its anonymous volumes.
    ///
    /// DELETE /containers/{id}
    pub async fn remove_container(&self, id: &str, force: bool) -> Result<(), EngineError> {
        let url = self
            .transport
            .url(&format!("/containers/{}?force={}&v=true", id, force));
        self.transport.delete_empty(&url).await
    }

    /// List containers, optionally restricted by label filters of the
    /// form `key=value`.
    ///
    /// GET /containers/json
    pub async fn list_containers(
        &self,
        all: bool,
        label_filters: &[&str],
    ) -> Result<Vec<ContainerSummary>, EngineError> {
        let filters = serde_json::json!({ "label": label_filters }).to_string();
        let all = if all { "true" } else { "false" };
        let url = self
            .transport
            .url_with("/containers/json", &[("all", all), ("filters", &filters)])?;
        self.transport.get_json(&url).await
    }

    /// Adjust a running container's resource limits.
    ///
    /// POST /containers/{id}/update
    pub async fn update_container(
        &self,
        id: &str,
        request: &ContainerUpdateRequest,
    ) -> Result<ContainerUpdateResponse, EngineError> {
        tracing::debug!(id = %id, "updating container resources");
        let url = self.transport.url(&format!("/containers/{}/update", id));
        self.transport.post_json(&url, request).await
    }

    /// Fetch one stats sample. The daemon takes two readings so the
    /// pre-CPU window is populated; expect the call to block ~1s.
    ///
    /// GET /containers/{id}/stats?stream=false
    pub async fn container_stats(&self, id: &str) -> Result<StatsSnapshot, EngineError> {
        let url = self
            .transport
            .url(&format!("/containers/{}/stats?stream=false", id));
        self.transport.get_json(&url).await
    }

    /// Fetch container logs, demultiplexed to text.
    ///
    /// GET /containers/{id}/logs
    pub async fn container_logs(&self, id: &str, query: &LogsQuery) -> Result<String, EngineError> {
        let mut params = format!("stdout=true&stderr=true&timestamps={}", query.timestamps);
        if let Some(tail) = query.tail {
            params.push_str(&format!("&tail={}", tail));
        }
        if let Some(since) = query.since {
            params.push_str(&format!("&since={}", since));
        }

        let url = self
            .transport
            .url(&format!("/containers/{}/logs?{}", id, params));
        let raw = self.transport.get_bytes(&url).await?;
        Ok(demux_log_stream(&raw))
    }

    // ========================================================================
    // Networks
    // ========================================================================

    /// Inspect a network by name or id.
    ///
    /// GET /networks/{name}
    pub async fn inspect_network(&self, name: &str) -> Result<NetworkInspect, EngineError> {
        let url = self.transport.url(&format!("/networks/{}", name));
        self.transport.get_json(&url).await
    }

    /// Create a network. A name collision surfaces as
    /// [`EngineError::Conflict`].
    ///
    /// POST /networks/create
    pub async fn create_network(
        &self,
        request: &NetworkCreateRequest,
    ) -> Result<NetworkCreateResponse, EngineError> {
        tracing::debug!(name = %request.name, driver = %request.driver, "creating network");
        let url = self.transport.url("/networks/create");
        self.transport.post_json(&url, request).await
    }

    // ========================================================================
    // Images
    // ========================================================================

    /// Inspect a local image.
    ///
    /// GET /images/{name}/json
    pub async fn inspect_image(&self, reference: &str) -> Result<ImageInspect, EngineError> {
        let url = self.transport.url(&format!("/images/{}/json", reference));
        self.transport.get_json(&url).await
    }

    /// Pull an image, draining the progress stream until the daemon
    /// finishes. `auth_header` is a pre-encoded `X-Registry-Auth`
    /// value for private registries.
    ///
    /// POST /images/create
    pub async fn pull_image(
        &self,
        reference: &str,
        auth_header: Option<&str>,
    ) -> Result<(), EngineError> {
        let (image, tag) = split_image_reference(reference);
        tracing::info!(image = %image, tag = %tag, "pulling image");

        let url = self
            .transport
            .url_with("/images/create", &[("fromImage", image), ("tag", tag)])?;
        let mut headers = Vec::new();
        if let Some(auth) = auth_header {
            headers.push(("X-Registry-Auth", auth));
        }

        let mut pull_error: Option<String> = None;
        self.transport
            .post_drain_lines(&url, &headers, |line| {
                match serde_json::from_str::<PullProgress>(line) {
                    Ok(progress) => {
                        if let Some(error) = progress.error {
                            pull_error = Some(error);
                        } else if let Some(status) = progress.status {
                            tracing::trace!(status = %status, "pull progress");
                        }
                    }
                    Err(_) => tracing::trace!(line = %line, "unparsed pull progress line"),
                }
            })
            .await?;

        match pull_error {
            Some(error) => Err(EngineError::Pull(error)),
            None => {
                tracing::info!(image = %image, tag = %tag, "image pulled");
                Ok(())
            }
        }
    }
}

/// Split an image reference into repository and tag, defaulting the
/// tag to `latest`. A colon inside the registry host (`host:5000/img`)
/// is not a tag separator.
fn split_image_reference(reference: &str) -> (&str, &str) {
    match reference.rsplit_once(':') {
        Some((image, tag)) if !tag.contains('/') => (image, tag),
        _ => (reference, "latest"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_image_reference() {
        assert_eq!(split_image_reference("trader"), ("trader", "latest"));
        assert_eq!(split_image_reference("trader:1.4"), ("trader", "1.4"));
        assert_eq!(
            split_image_reference("registry.local:5000/trader"),
            ("registry.local:5000/trader", "latest")
        );
        assert_eq!(
            split_image_reference("registry.local:5000/trader:1.4"),
            ("registry.local:5000/trader", "1.4")
        );
    }
}
