//! Docker engine backend for the bot runtime.
//!
//! Implements the [`Runtime`](runtime_core::Runtime),
//! [`BacktestRunner`](runtime_core::BacktestRunner) and
//! [`DataDownloader`](runtime_core::DataDownloader) contracts against
//! one Docker daemon, reached over its HTTP API. Managed bots are
//! long-lived labelled containers; downloads and backtests are
//! one-shot containers named and labelled by task or run id. Call
//! [`register`] once at startup to make the backend resolvable under
//! the `docker` tag.

mod backtest;
mod command;
mod config;
mod download;
mod errors;
mod naming;
mod provision;
mod runtime;
mod status;

pub use backtest::DockerBacktestRunner;
pub use config::{DockerConfig, DEFAULT_API_VERSION, DEFAULT_NETWORK};
pub use download::DockerDataDownloader;
pub use runtime::DockerRuntime;

use std::sync::Arc;

use runtime_core::{
    register_backend, BackendFactories, BackendKind, SharedBacktestRunner, SharedDataDownloader,
    SharedRuntime,
};

/// Tag this backend registers under.
pub const DOCKER_BACKEND: BackendKind = BackendKind::new("docker");

/// Register the Docker backend's factories under [`DOCKER_BACKEND`].
///
/// The runtime factory constructs without touching the daemon; the
/// registry's post-construction health check provides the
/// reachability gate. The backtest and download factories verify the
/// daemon answers before returning.
pub fn register() {
    register_backend(
        DOCKER_BACKEND,
        BackendFactories {
            runtime: |raw| {
                Box::pin(async move {
                    let config = DockerConfig::from_map(&raw)?;
                    let runtime = DockerRuntime::new(config)?;
                    Ok(Arc::new(runtime) as SharedRuntime)
                })
            },
            backtest_runner: |raw| {
                Box::pin(async move {
                    let config = DockerConfig::from_map(&raw)?;
                    let runner = DockerBacktestRunner::connect(config).await?;
                    Ok(Arc::new(runner) as SharedBacktestRunner)
                })
            },
            data_downloader: |raw| {
                Box::pin(async move {
                    let config = DockerConfig::from_map(&raw)?;
                    let downloader = DockerDataDownloader::connect(config).await?;
                    Ok(Arc::new(downloader) as SharedDataDownloader)
                })
            },
            validate_config: |raw| {
                let config = DockerConfig::from_map(raw)?;
                config.validate()
            },
        },
    );
}

#[cfg(test)]
mod tests {
    use runtime_core::ErrorKind;

    use super::*;

    #[test]
    fn test_register_exposes_docker_tag() {
        register();
        assert_eq!(BackendKind::resolve("docker").unwrap(), DOCKER_BACKEND);
    }

    #[test]
    fn test_registered_validator_rejects_bad_config() {
        register();

        let map = serde_json::json!({
            "host": "ftp://nowhere",
            "base_dir": "/var/lib/botfleet"
        });
        let err = runtime_core::validate_backend_config(DOCKER_BACKEND, map.as_object().unwrap())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);

        let ok = serde_json::json!({
            "host": "unix:///var/run/docker.sock",
            "base_dir": "/var/lib/botfleet"
        });
        runtime_core::validate_backend_config(DOCKER_BACKEND, ok.as_object().unwrap()).unwrap();
    }
}
