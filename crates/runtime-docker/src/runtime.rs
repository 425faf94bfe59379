//! The Docker-backed [`Runtime`] implementation.

use std::collections::BTreeMap;

use async_trait::async_trait;
use common::is_safe_id;
use config_inject::{ConfigFilePaths, ConfigInjector, ConfigLayer};
use engine_client::{
    ContainerCreateRequest, ContainerInspect, ContainerSummary, ContainerUpdateRequest,
    EmptyObject, EngineClient, HostConfig, LogsQuery, NetworkingConfig, PortBinding,
    RestartPolicy, StatsSnapshot,
};
use futures_util::future::join_all;
use model::{LogOptions, ResourceLimits, UpdateBotSpec, WorkloadSpec, WorkloadStatus};
use runtime_core::{BotApiClient, ErrorKind, Runtime, RuntimeError};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::command::{data_bundle_prelude, trade_command};
use crate::config::DockerConfig;
use crate::errors::{engine_err, inject_err};
use crate::naming::{
    bot_labels, container_name, id_from_container_name, managed_filter, LABEL_BOT_ID,
};
use crate::provision::{ensure_image, ensure_network, ProvisionGuard};
use crate::status::{api_port, first_host_port, map_status};

/// Runs managed bots as labelled containers on one Docker daemon.
///
/// Stateless between calls: every operation resolves the bot's
/// container fresh, so externally stopped or removed containers are
/// seen immediately.
pub struct DockerRuntime {
    engine: EngineClient,
    injector: ConfigInjector,
    config: DockerConfig,
}

impl DockerRuntime {
    /// Build a runtime against the daemon in `config`. Construction is
    /// local; reachability is checked by the registry's
    /// post-construction health check.
    pub fn new(config: DockerConfig) -> Result<Self, RuntimeError> {
        config.validate()?;
        let addr = config.daemon_addr()?;
        let engine = EngineClient::new(&addr, config.tls.as_ref(), &config.api_version)
            .map_err(|err| engine_err("connect_runtime", None, err))?;
        let injector = ConfigInjector::new(&config.base_dir);
        Ok(Self {
            engine,
            injector,
            config,
        })
    }

    /// Inspect the container behind `bot_id`.
    ///
    /// Lookup order: managed name, raw container id, then the id label
    /// so a renamed container is still found. A miss on all three is
    /// [`ErrorKind::NotFound`].
    async fn resolve(
        &self,
        op: &'static str,
        bot_id: &str,
    ) -> Result<ContainerInspect, RuntimeError> {
        if !is_safe_id(bot_id) {
            return Err(RuntimeError::not_found(op, bot_id));
        }

        for candidate in [container_name(bot_id), bot_id.to_string()] {
            match self.engine.inspect_container(&candidate).await {
                Ok(inspect) => return Ok(inspect),
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(engine_err(op, Some(bot_id), err)),
            }
        }

        let filter = format!("{}={}", LABEL_BOT_ID, bot_id);
        let summaries = self
            .engine
            .list_containers(true, &[&filter])
            .await
            .map_err(|err| engine_err(op, Some(bot_id), err))?;
        let summary = match summaries.first() {
            Some(summary) => summary,
            None => return Err(RuntimeError::not_found(op, bot_id)),
        };

        match self.engine.inspect_container(&summary.id).await {
            Ok(inspect) => Ok(inspect),
            Err(err) if err.is_not_found() => Err(RuntimeError::not_found(op, bot_id)),
            Err(err) => Err(engine_err(op, Some(bot_id), err)),
        }
    }

    fn build_create_request(
        &self,
        spec: &WorkloadSpec,
        paths: &ConfigFilePaths,
    ) -> ContainerCreateRequest {
        let command = trade_command(paths, &spec.strategy_name);
        let (cmd, entrypoint) = match &spec.data_download_url {
            Some(url) => {
                let data_dir = self.injector.bot_dir(&spec.bot_id).join("data");
                let prelude = data_bundle_prelude(url, &data_dir.display().to_string(), &command);
                // An explicit empty Cmd keeps the image's default CMD
                // from being appended to the entrypoint.
                (Some(Vec::new()), Some(prelude))
            }
            None => (Some(command), None),
        };

        let port_key = format!("{}/tcp", spec.api_port);
        let (network_mode, networking_config) = match &spec.network_mode {
            Some(mode) => (Some(mode.clone()), None),
            None => (
                Some(self.config.network.clone()),
                Some(NetworkingConfig {
                    endpoints_config: BTreeMap::from([(
                        self.config.network.clone(),
                        EmptyObject {},
                    )]),
                }),
            ),
        };

        ContainerCreateRequest {
            image: spec.image.clone(),
            env: env_pairs(&workload_env(spec)),
            cmd,
            entrypoint,
            working_dir: None,
            labels: bot_labels(&spec.bot_id, &spec.name),
            exposed_ports: BTreeMap::from([(port_key.clone(), EmptyObject {})]),
            host_config: HostConfig {
                binds: vec![format!(
                    "{}:{}",
                    self.config.mount_source(),
                    self.config.base_dir
                )],
                // An empty host port asks the engine for an ephemeral
                // one.
                port_bindings: BTreeMap::from([(port_key, vec![PortBinding::default()])]),
                memory: spec.resources.memory_bytes.map(|bytes| bytes as i64),
                cpu_quota: spec.resources.cpu_quota,
                cpu_period: spec.resources.cpu_period,
                network_mode,
                restart_policy: Some(RestartPolicy::unless_stopped()),
            },
            networking_config,
        }
    }

    /// Best-effort stats sample for a running container.
    async fn stats_if_running(&self, inspect: &ContainerInspect) -> Option<StatsSnapshot> {
        if !inspect.state.running {
            return None;
        }
        match self.engine.container_stats(&inspect.id).await {
            Ok(stats) => Some(stats),
            Err(err) => {
                debug!(container = %inspect.plain_name(), error = %err, "stats sample failed");
                None
            }
        }
    }

    /// One row of `list_bots`. `Ok(None)` means the container vanished
    /// between listing and inspection.
    async fn list_entry(
        &self,
        summary: &ContainerSummary,
    ) -> Result<Option<WorkloadStatus>, RuntimeError> {
        let bot_id = summary
            .labels
            .get(LABEL_BOT_ID)
            .map(String::as_str)
            .or_else(|| {
                summary
                    .names
                    .first()
                    .and_then(|name| id_from_container_name(name))
            })
            .unwrap_or(&summary.id)
            .to_string();

        let inspect = match self.engine.inspect_container(&summary.id).await {
            Ok(inspect) => inspect,
            Err(err) if err.is_not_found() => {
                warn!(bot_id = %bot_id, "container disappeared during listing, skipped");
                return Ok(None);
            }
            Err(err) => return Err(engine_err("list_bots", Some(&bot_id), err)),
        };

        let stats = self.stats_if_running(&inspect).await;
        Ok(Some(map_status(
            &bot_id,
            &inspect,
            stats.as_ref(),
            &self.config.network,
        )))
    }
}

#[async_trait]
impl Runtime for DockerRuntime {
    async fn create_bot(&self, spec: &WorkloadSpec) -> Result<String, RuntimeError> {
        const OP: &str = "create_bot";

        if !is_safe_id(&spec.bot_id) {
            return Err(
                RuntimeError::invalid_config(OP, format!("invalid bot id {:?}", spec.bot_id))
                    .with_bot(&spec.bot_id),
            );
        }

        // Check before the first side effect; rediscovering the
        // conflict at container create would roll back the existing
        // bot's config files.
        let name = container_name(&spec.bot_id);
        match self.engine.inspect_container(&name).await {
            Ok(_) => {
                return Err(RuntimeError::new(OP, ErrorKind::AlreadyExists)
                    .with_bot(&spec.bot_id)
                    .with_message(format!("container {} already exists", name)));
            }
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(engine_err(OP, Some(&spec.bot_id), err)),
        }

        ensure_network(OP, &self.engine, &self.config).await?;
        ensure_image(OP, &self.engine, &self.config, &spec.image).await?;

        let paths = self
            .injector
            .write_bot_files(spec)
            .await
            .map_err(|err| inject_err(OP, &spec.bot_id, err))?;
        let mut guard = ProvisionGuard::new(&self.engine, &self.injector, &spec.bot_id);

        let request = self.build_create_request(spec, &paths);
        let created = match self.engine.create_container(&name, &request).await {
            Ok(created) => created,
            Err(err) => {
                let err = engine_err(OP, Some(&spec.bot_id), err);
                guard.fire().await;
                return Err(err);
            }
        };
        guard.container_created(&created.id);

        if let Err(err) = self.engine.start_container(&created.id).await {
            let err = engine_err(OP, Some(&spec.bot_id), err);
            guard.fire().await;
            return Err(err);
        }

        guard.disarm();
        info!(bot_id = %spec.bot_id, container = %name, image = %spec.image, "bot created");
        Ok(created.id)
    }

    async fn delete_bot(&self, bot_id: &str) -> Result<(), RuntimeError> {
        const OP: &str = "delete_bot";

        let inspect = match self.resolve(OP, bot_id).await {
            Ok(inspect) => inspect,
            Err(err) if err.is_not_found() => {
                // The container is gone; still sweep the config
                // namespace a previous partial delete may have left.
                if is_safe_id(bot_id) {
                    if let Err(inject) = self.injector.delete_bot_files(bot_id).await {
                        warn!(bot_id = %bot_id, error = %inject, "orphan config sweep failed");
                    }
                }
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        if inspect.state.running {
            self.engine
                .stop_container(&inspect.id, self.config.stop_timeout_secs)
                .await
                .map_err(|err| engine_err(OP, Some(bot_id), err))?;
        }
        match self.engine.remove_container(&inspect.id, true).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(engine_err(OP, Some(bot_id), err)),
        }

        self.injector
            .delete_bot_files(bot_id)
            .await
            .map_err(|err| inject_err(OP, bot_id, err))?;

        info!(bot_id = %bot_id, "bot deleted");
        Ok(())
    }

    async fn start_bot(&self, bot_id: &str) -> Result<(), RuntimeError> {
        let inspect = self.resolve("start_bot", bot_id).await?;
        self.engine
            .start_container(&inspect.id)
            .await
            .map_err(|err| engine_err("start_bot", Some(bot_id), err))?;
        info!(bot_id = %bot_id, "bot started");
        Ok(())
    }

    async fn stop_bot(&self, bot_id: &str) -> Result<(), RuntimeError> {
        let inspect = self.resolve("stop_bot", bot_id).await?;
        self.engine
            .stop_container(&inspect.id, self.config.stop_timeout_secs)
            .await
            .map_err(|err| engine_err("stop_bot", Some(bot_id), err))?;
        info!(bot_id = %bot_id, "bot stopped");
        Ok(())
    }

    async fn restart_bot(&self, bot_id: &str) -> Result<(), RuntimeError> {
        let inspect = self.resolve("restart_bot", bot_id).await?;
        self.engine
            .restart_container(&inspect.id, self.config.stop_timeout_secs)
            .await
            .map_err(|err| engine_err("restart_bot", Some(bot_id), err))?;
        info!(bot_id = %bot_id, "bot restarted");
        Ok(())
    }

    async fn bot_status(&self, bot_id: &str) -> Result<WorkloadStatus, RuntimeError> {
        let inspect = self.resolve("bot_status", bot_id).await?;
        let stats = self.stats_if_running(&inspect).await;
        Ok(map_status(
            bot_id,
            &inspect,
            stats.as_ref(),
            &self.config.network,
        ))
    }

    async fn container_ip(&self, bot_id: &str) -> Result<String, RuntimeError> {
        let inspect = self.resolve("container_ip", bot_id).await?;
        inspect
            .network_settings
            .as_ref()
            .and_then(|settings| settings.container_ip(&self.config.network))
            .map(str::to_string)
            .ok_or_else(|| {
                RuntimeError::new("container_ip", ErrorKind::Internal)
                    .with_bot(bot_id)
                    .with_message("container has no network address; is it running?")
            })
    }

    async fn bot_api_url(&self, bot_id: &str) -> Result<String, RuntimeError> {
        let inspect = self.resolve("bot_api_url", bot_id).await?;
        inspect
            .network_settings
            .as_ref()
            .and_then(first_host_port)
            .map(|port| format!("http://{}:{}", self.engine.daemon_host(), port))
            .ok_or_else(|| {
                RuntimeError::new("bot_api_url", ErrorKind::Internal)
                    .with_bot(bot_id)
                    .with_message("container has no host-mapped port")
            })
    }

    async fn bot_api_client(&self, bot_id: &str) -> Result<BotApiClient, RuntimeError> {
        const OP: &str = "bot_api_client";
        let inspect = self.resolve(OP, bot_id).await?;
        let settings = inspect.network_settings.as_ref();

        // Prefer the direct container address when a quick TCP probe
        // answers; callers co-located on the daemon network get to skip
        // the host port mapping.
        if let Some((ip, port)) = settings
            .and_then(|settings| settings.container_ip(&self.config.network))
            .zip(settings.and_then(api_port))
        {
            let probe = tokio::time::timeout(
                self.config.probe_timeout(),
                TcpStream::connect((ip, port)),
            )
            .await;
            if matches!(probe, Ok(Ok(_))) {
                return BotApiClient::with_default_timeout(format!("http://{}:{}", ip, port));
            }
            debug!(bot_id = %bot_id, ip = %ip, port = port, "container address unreachable, using host mapping");
        }

        let port = settings.and_then(first_host_port).ok_or_else(|| {
            RuntimeError::new(OP, ErrorKind::Internal)
                .with_bot(bot_id)
                .with_message("bot API is unreachable: no container address and no host port")
        })?;
        BotApiClient::with_default_timeout(format!("http://{}:{}", self.engine.daemon_host(), port))
    }

    async fn bot_logs(&self, bot_id: &str, opts: &LogOptions) -> Result<String, RuntimeError> {
        let inspect = self.resolve("bot_logs", bot_id).await?;
        self.engine
            .container_logs(&inspect.id, &logs_query(opts))
            .await
            .map_err(|err| engine_err("bot_logs", Some(bot_id), err))
    }

    async fn update_bot(&self, bot_id: &str, update: &UpdateBotSpec) -> Result<(), RuntimeError> {
        const OP: &str = "update_bot";
        let inspect = self.resolve(OP, bot_id).await?;

        if let Some(resources) = &update.resources {
            if !resources.is_empty() {
                self.engine
                    .update_container(&inspect.id, &resource_update(resources))
                    .await
                    .map_err(|err| engine_err(OP, Some(bot_id), err))?;
            }
        }

        let layers = [
            (ConfigLayer::Exchange, &update.exchange_config),
            (ConfigLayer::Strategy, &update.strategy_config),
            (ConfigLayer::Bot, &update.bot_config),
        ];
        for (layer, config) in layers {
            if let Some(config) = config {
                self.injector
                    .write_layer(bot_id, layer, config)
                    .await
                    .map_err(|err| inject_err(OP, bot_id, err))?;
            }
        }

        if update.restart {
            self.engine
                .restart_container(&inspect.id, self.config.stop_timeout_secs)
                .await
                .map_err(|err| engine_err(OP, Some(bot_id), err))?;
        }

        info!(
            bot_id = %bot_id,
            config_changed = update.touches_config(),
            restarted = update.restart,
            "bot updated"
        );
        Ok(())
    }

    async fn list_bots(&self) -> Result<Vec<WorkloadStatus>, RuntimeError> {
        let summaries = self
            .engine
            .list_containers(true, &[&managed_filter()])
            .await
            .map_err(|err| engine_err("list_bots", None, err))?;

        let entries = join_all(summaries.iter().map(|summary| self.list_entry(summary))).await;

        let mut statuses = Vec::with_capacity(entries.len());
        for entry in entries {
            if let Some(status) = entry? {
                statuses.push(status);
            }
        }
        Ok(statuses)
    }

    async fn health_check(&self) -> Result<(), RuntimeError> {
        self.engine
            .ping()
            .await
            .map_err(|err| engine_err("health_check", None, err))
    }
}

/// Workload metadata exposed to the container, with the spec's own
/// variables layered on top so tenants can override.
fn workload_env(spec: &WorkloadSpec) -> BTreeMap<String, String> {
    let mut env = BTreeMap::from([
        ("BOT_ID".to_string(), spec.bot_id.clone()),
        ("BOT_NAME".to_string(), spec.name.clone()),
        ("STRATEGY_NAME".to_string(), spec.strategy_name.clone()),
    ]);
    if let Some(url) = &spec.data_download_url {
        env.insert("DATA_DOWNLOAD_URL".to_string(), url.clone());
    }
    env.extend(spec.env.iter().map(|(key, value)| (key.clone(), value.clone())));
    env
}

fn env_pairs(env: &BTreeMap<String, String>) -> Vec<String> {
    env.iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect()
}

pub(crate) fn logs_query(opts: &LogOptions) -> LogsQuery {
    LogsQuery {
        tail: opts.tail,
        since: opts.since,
        timestamps: opts.timestamps,
    }
}

/// Live resource-limit update. The swap ceiling moves with the memory
/// limit; the engine rejects a Memory above the current MemorySwap.
fn resource_update(resources: &ResourceLimits) -> ContainerUpdateRequest {
    ContainerUpdateRequest {
        memory: resources.memory_bytes.map(|bytes| bytes as i64),
        memory_swap: resources.memory_bytes.map(|bytes| (bytes * 2) as i64),
        cpu_quota: resources.cpu_quota,
        cpu_period: resources.cpu_period,
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn runtime() -> DockerRuntime {
        let map = serde_json::json!({
            "host": "tcp://127.0.0.1:2375",
            "base_dir": "/var/lib/botfleet"
        });
        let config = DockerConfig::from_map(map.as_object().unwrap()).unwrap();
        DockerRuntime::new(config).unwrap()
    }

    fn spec() -> WorkloadSpec {
        serde_json::from_value(serde_json::json!({
            "bot_id": "alpha-1",
            "name": "Alpha One",
            "image": "trader:latest",
            "strategy_name": "Rsi",
            "strategy_source": "class Rsi: pass",
            "api_port": 8080,
            "resources": {"memory_bytes": 536870912, "cpu_quota": 50000, "cpu_period": 100000},
            "env": {"TZ": "UTC"}
        }))
        .unwrap()
    }

    fn paths() -> ConfigFilePaths {
        ConfigFilePaths {
            exchange: Some(PathBuf::from(
                "/var/lib/botfleet/alpha-1/config.exchange.json",
            )),
            strategy: None,
            bot: None,
            secure: PathBuf::from("/var/lib/botfleet/alpha-1/config.secure.json"),
            strategy_file: PathBuf::from("/var/lib/botfleet/alpha-1/strategies/Rsi.py"),
        }
    }

    #[test]
    fn test_create_request_shape() {
        let request = runtime().build_create_request(&spec(), &paths());
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["Image"], "trader:latest");
        let env: Vec<&str> = json["Env"]
            .as_array()
            .unwrap()
            .iter()
            .map(|value| value.as_str().unwrap())
            .collect();
        assert_eq!(
            env,
            ["BOT_ID=alpha-1", "BOT_NAME=Alpha One", "STRATEGY_NAME=Rsi", "TZ=UTC"]
        );
        assert_eq!(json["Cmd"][0], "trader");
        assert_eq!(json["Cmd"][1], "trade");
        assert!(json.get("Entrypoint").is_none());
        assert_eq!(json["Labels"]["botfleet.managed"], "true");
        assert_eq!(json["Labels"]["botfleet.bot.id"], "alpha-1");
        assert!(json["ExposedPorts"].get("8080/tcp").is_some());
        assert_eq!(json["HostConfig"]["PortBindings"]["8080/tcp"][0]["HostPort"], "");
        assert_eq!(
            json["HostConfig"]["Binds"][0],
            "/var/lib/botfleet:/var/lib/botfleet"
        );
        assert_eq!(json["HostConfig"]["Memory"], 536870912_i64);
        assert_eq!(json["HostConfig"]["RestartPolicy"]["Name"], "unless-stopped");
        assert_eq!(json["HostConfig"]["NetworkMode"], "botfleet");
        assert!(json["NetworkingConfig"]["EndpointsConfig"]
            .get("botfleet")
            .is_some());
    }

    #[test]
    fn test_create_request_with_data_bundle() {
        let mut spec = spec();
        spec.data_download_url = Some("https://bundles.example.com/a1.tar.gz".to_string());
        let request = runtime().build_create_request(&spec, &paths());
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["Entrypoint"][0], "sh");
        assert_eq!(json["Entrypoint"][1], "-c");
        let script = json["Entrypoint"][2].as_str().unwrap();
        assert!(script.contains("https://bundles.example.com/a1.tar.gz"));
        assert!(script.contains("/var/lib/botfleet/alpha-1/data"));
        assert!(script.contains("exec trader trade"));
        // Explicit empty Cmd so the image default is not appended.
        assert_eq!(json["Cmd"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn test_create_request_custom_network_mode() {
        let mut spec = spec();
        spec.network_mode = Some("host".to_string());
        let request = runtime().build_create_request(&spec, &paths());
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["HostConfig"]["NetworkMode"], "host");
        assert!(json.get("NetworkingConfig").is_none());
    }

    #[test]
    fn test_spec_env_overrides_builtin() {
        let mut spec = spec();
        spec.env.insert("BOT_NAME".to_string(), "shadowed".to_string());

        let env = workload_env(&spec);
        assert_eq!(env.get("BOT_NAME").map(String::as_str), Some("shadowed"));
        assert_eq!(env.get("BOT_ID").map(String::as_str), Some("alpha-1"));
    }

    #[test]
    fn test_resource_update_moves_swap_ceiling() {
        let resources = ResourceLimits {
            memory_bytes: Some(512 << 20),
            cpu_quota: Some(50_000),
            cpu_period: None,
        };
        let request = resource_update(&resources);

        assert_eq!(request.memory, Some(512 << 20));
        assert_eq!(request.memory_swap, Some(1024 << 20));
        assert_eq!(request.cpu_quota, Some(50_000));
        assert_eq!(request.cpu_period, None);
    }

    #[test]
    fn test_logs_query_carries_all_options() {
        let opts = LogOptions {
            tail: Some(200),
            since: Some(1_700_000_000),
            timestamps: true,
        };
        let query = logs_query(&opts);
        assert_eq!(query.tail, Some(200));
        assert_eq!(query.since, Some(1_700_000_000));
        assert!(query.timestamps);

        let tail_only = logs_query(&LogOptions::tail(50));
        assert_eq!(tail_only.tail, Some(50));
        assert_eq!(tail_only.since, None);
        assert!(!tail_only.timestamps);
    }

    #[tokio::test]
    async fn test_hostile_bot_id_is_not_found_without_engine_call() {
        // Path-hostile ids must short-circuit before any lookup; the
        // daemon here does not exist, so reaching it would surface as a
        // connection error instead.
        let err = runtime().resolve("bot_status", "../etc").await.unwrap_err();
        assert!(err.is_not_found());

        let err = runtime().bot_status("a b").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_create_rejects_hostile_bot_id() {
        let mut spec = spec();
        spec.bot_id = "../escape".to_string();
        let err = runtime().create_bot(&spec).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
        assert!(!err.is_retryable());
    }
}
