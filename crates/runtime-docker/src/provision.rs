//! Shared provisioning steps and rollback for half-created workloads.

use std::collections::BTreeMap;

use config_inject::ConfigInjector;
use engine_client::{EngineClient, EngineError, NetworkCreateRequest};
use runtime_core::RuntimeError;
use tracing::{info, warn};

use crate::config::DockerConfig;
use crate::errors::engine_err;
use crate::naming::LABEL_MANAGED;

/// Make sure the managed bridge network exists.
pub(crate) async fn ensure_network(
    op: &'static str,
    engine: &EngineClient,
    config: &DockerConfig,
) -> Result<(), RuntimeError> {
    match engine.inspect_network(&config.network).await {
        Ok(_) => return Ok(()),
        Err(err) if err.is_not_found() => {}
        Err(err) => return Err(engine_err(op, None, err)),
    }

    info!(network = %config.network, "creating managed network");
    let request = NetworkCreateRequest {
        name: config.network.clone(),
        driver: "bridge".to_string(),
        labels: BTreeMap::from([(LABEL_MANAGED.to_string(), "true".to_string())]),
    };
    match engine.create_network(&request).await {
        Ok(_) => Ok(()),
        // Another manager won the create race; the network exists now.
        Err(EngineError::Conflict(_)) => Ok(()),
        Err(err) => Err(engine_err(op, None, err)),
    }
}

/// Make sure `image` is present locally, pulling it when absent.
pub(crate) async fn ensure_image(
    op: &'static str,
    engine: &EngineClient,
    config: &DockerConfig,
    image: &str,
) -> Result<(), RuntimeError> {
    match engine.inspect_image(image).await {
        Ok(_) => return Ok(()),
        Err(err) if err.is_not_found() => {}
        Err(err) => return Err(engine_err(op, None, err)),
    }

    let auth = config
        .registry_auth
        .as_ref()
        .map(|credentials| credentials.header_value());
    engine
        .pull_image(image, auth.as_deref())
        .await
        .map_err(|err| engine_err(op, None, err))
}

/// Remove whatever a failed create left behind: the container when one
/// was created, then the config namespace. Sub-failures are logged and
/// swallowed so the original error is what callers see.
pub(crate) async fn rollback_create(
    engine: &EngineClient,
    injector: &ConfigInjector,
    bot_id: &str,
    container_id: Option<&str>,
) {
    if let Some(container_id) = container_id {
        match engine.remove_container(container_id, true).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => {
                warn!(bot_id = %bot_id, error = %err, "rollback could not remove container");
            }
        }
    }
    if let Err(err) = injector.delete_bot_files(bot_id).await {
        warn!(bot_id = %bot_id, error = %err, "rollback could not remove config files");
    }
}

/// Rolls back a partially provisioned workload unless disarmed.
///
/// The create path arms one of these right after its first side effect.
/// Error paths call [`fire`](Self::fire) so cleanup finishes before the
/// error propagates; a dropped create future falls through to `Drop`,
/// which spawns the same rollback on the running executor.
pub(crate) struct ProvisionGuard {
    engine: EngineClient,
    injector: ConfigInjector,
    bot_id: String,
    container_id: Option<String>,
    armed: bool,
}

impl ProvisionGuard {
    pub(crate) fn new(engine: &EngineClient, injector: &ConfigInjector, bot_id: &str) -> Self {
        Self {
            engine: engine.clone(),
            injector: injector.clone(),
            bot_id: bot_id.to_string(),
            container_id: None,
            armed: true,
        }
    }

    /// Record the created container so rollback removes it too.
    pub(crate) fn container_created(&mut self, container_id: &str) {
        self.container_id = Some(container_id.to_string());
    }

    /// Run the rollback now, then disarm.
    pub(crate) async fn fire(&mut self) {
        if !self.armed {
            return;
        }
        self.armed = false;
        rollback_create(
            &self.engine,
            &self.injector,
            &self.bot_id,
            self.container_id.as_deref(),
        )
        .await;
    }

    /// The workload is fully provisioned; nothing left to roll back.
    pub(crate) fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ProvisionGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let engine = self.engine.clone();
        let injector = self.injector.clone();
        let bot_id = std::mem::take(&mut self.bot_id);
        let container_id = self.container_id.take();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    warn!(bot_id = %bot_id, "create dropped mid-flight, rolling back");
                    rollback_create(&engine, &injector, &bot_id, container_id.as_deref()).await;
                });
            }
            Err(_) => {
                warn!(
                    bot_id = %bot_id,
                    "create dropped outside an async context; artifacts may remain"
                );
            }
        }
    }
}
