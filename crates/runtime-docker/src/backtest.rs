//! Isolated backtest execution.
//!
//! Every run gets its own workspace directory named by run id; the
//! container receives that path as its working directory and the
//! trading process resolves historical data at the fixed `data`
//! subpath, where one shared volume is mounted read-only. Concurrent
//! runs therefore write results into disjoint workspaces while reading
//! a single dataset.

use std::path::Path;

use async_trait::async_trait;
use common::is_safe_id;
use config_inject::ConfigInjector;
use engine_client::{
    ContainerCreateRequest, ContainerInspect, EngineClient, HostConfig, RestartPolicy,
};
use model::{BacktestRun, BacktestSpec, BacktestState, BacktestStatus, LogOptions};
use runtime_core::{BacktestRunner, RuntimeError};
use tracing::info;

use crate::command::backtest_command;
use crate::config::DockerConfig;
use crate::errors::{engine_err, inject_err};
use crate::naming::{container_name, new_run_id, task_labels};
use crate::provision::{ensure_image, ProvisionGuard};
use crate::runtime::logs_query;
use crate::status::{failure_detail, task_phase, TaskPhase};

/// Subpath of a run's workspace where the process expects historical
/// data.
const RUN_DATA_SUBDIR: &str = "data";

/// Runs backtests as one-shot containers on a Docker daemon.
pub struct DockerBacktestRunner {
    engine: EngineClient,
    injector: ConfigInjector,
    config: DockerConfig,
}

impl DockerBacktestRunner {
    /// Build a runner for the daemon in `config` without touching the
    /// network.
    pub fn new(config: DockerConfig) -> Result<Self, RuntimeError> {
        config.validate()?;
        let addr = config.daemon_addr()?;
        let engine = EngineClient::new(&addr, config.tls.as_ref(), &config.api_version)
            .map_err(|err| engine_err("connect_backtest_runner", None, err))?;
        let injector = ConfigInjector::new(&config.base_dir);
        Ok(Self {
            engine,
            injector,
            config,
        })
    }

    /// Build a runner and verify the daemon answers.
    pub async fn connect(config: DockerConfig) -> Result<Self, RuntimeError> {
        let runner = Self::new(config)?;
        runner
            .engine
            .ping()
            .await
            .map_err(|err| engine_err("connect_backtest_runner", None, err))?;
        Ok(runner)
    }

    async fn inspect_run(
        &self,
        op: &'static str,
        run_id: &str,
    ) -> Result<ContainerInspect, RuntimeError> {
        if !is_safe_id(run_id) {
            return Err(RuntimeError::not_found(op, run_id));
        }
        match self.engine.inspect_container(&container_name(run_id)).await {
            Ok(inspect) => Ok(inspect),
            Err(err) if err.is_not_found() => Err(RuntimeError::not_found(op, run_id)),
            Err(err) => Err(engine_err(op, Some(run_id), err)),
        }
    }
}

#[async_trait]
impl BacktestRunner for DockerBacktestRunner {
    async fn run(&self, spec: &BacktestSpec) -> Result<BacktestRun, RuntimeError> {
        const OP: &str = "run_backtest";

        let data_volume = self.config.data_volume.as_deref().ok_or_else(|| {
            RuntimeError::invalid_config(OP, "data_volume is required to run backtests")
        })?;

        ensure_image(OP, &self.engine, &self.config, &spec.image).await?;

        let run_id = new_run_id();
        let paths = self
            .injector
            .write_run_files(&run_id, spec)
            .await
            .map_err(|err| inject_err(OP, &run_id, err))?;
        let mut guard = ProvisionGuard::new(&self.engine, &self.injector, &run_id);

        let workspace = paths.workspace.display().to_string();
        let request = ContainerCreateRequest {
            image: spec.image.clone(),
            cmd: Some(backtest_command(
                &paths,
                &spec.strategy_name,
                spec.timerange.as_deref(),
            )),
            working_dir: Some(workspace.clone()),
            labels: task_labels(&run_id),
            host_config: HostConfig {
                binds: run_binds(&self.config, data_volume, &paths.workspace),
                restart_policy: Some(RestartPolicy::no()),
                ..HostConfig::default()
            },
            ..ContainerCreateRequest::default()
        };

        let created = match self
            .engine
            .create_container(&container_name(&run_id), &request)
            .await
        {
            Ok(created) => created,
            Err(err) => {
                let err = engine_err(OP, Some(&run_id), err);
                guard.fire().await;
                return Err(err);
            }
        };
        guard.container_created(&created.id);

        if let Err(err) = self.engine.start_container(&created.id).await {
            let err = engine_err(OP, Some(&run_id), err);
            guard.fire().await;
            return Err(err);
        }

        guard.disarm();
        info!(run_id = %run_id, workspace = %workspace, image = %spec.image, "backtest started");
        Ok(BacktestRun {
            run_id,
            container_id: created.id,
            workspace,
        })
    }

    async fn status(&self, run_id: &str) -> Result<BacktestStatus, RuntimeError> {
        let inspect = self.inspect_run("backtest_status", run_id).await?;
        let phase = task_phase(&inspect.state);
        let (state, exit_code) = run_state(phase);

        let error = match phase {
            TaskPhase::Failed(code) => Some(failure_detail(&self.engine, &inspect.id, code).await),
            _ => None,
        };

        Ok(BacktestStatus {
            run_id: run_id.to_string(),
            state,
            exit_code,
            error,
        })
    }

    async fn logs(&self, run_id: &str, opts: &LogOptions) -> Result<String, RuntimeError> {
        let inspect = self.inspect_run("backtest_logs", run_id).await?;
        self.engine
            .container_logs(&inspect.id, &logs_query(opts))
            .await
            .map_err(|err| engine_err("backtest_logs", Some(run_id), err))
    }

    async fn cleanup(&self, run_id: &str) -> Result<(), RuntimeError> {
        const OP: &str = "backtest_cleanup";
        if !is_safe_id(run_id) {
            return Err(RuntimeError::not_found(OP, run_id));
        }

        match self
            .engine
            .remove_container(&container_name(run_id), true)
            .await
        {
            Ok(()) => {}
            // Cleanup of an already-removed run still sweeps the
            // workspace below.
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(engine_err(OP, Some(run_id), err)),
        }

        self.injector
            .delete_bot_files(run_id)
            .await
            .map_err(|err| inject_err(OP, run_id, err))?;

        info!(run_id = %run_id, "backtest removed");
        Ok(())
    }
}

fn run_state(phase: TaskPhase) -> (BacktestState, Option<i64>) {
    match phase {
        TaskPhase::Pending => (BacktestState::Pending, None),
        TaskPhase::Running => (BacktestState::Running, None),
        TaskPhase::Completed => (BacktestState::Completed, Some(0)),
        TaskPhase::Failed(code) => (BacktestState::Failed, Some(code)),
    }
}

/// The run's two mounts: the shared config volume at its usual path,
/// and the dataset read-only at the workspace's `data` subpath.
fn run_binds(config: &DockerConfig, data_volume: &str, workspace: &Path) -> Vec<String> {
    vec![
        format!("{}:{}", config.mount_source(), config.base_dir),
        format!(
            "{}:{}:ro",
            data_volume,
            workspace.join(RUN_DATA_SUBDIR).display()
        ),
    ]
}
