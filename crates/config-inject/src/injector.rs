//! Per-workload config file writing.

use std::path::{Path, PathBuf};

use common::is_safe_id;
use model::{BacktestSpec, ConfigMap, WorkloadSpec};
use thiserror::Error;
use tracing::{debug, warn};

use crate::sanitize::strategy_filename;

/// Subdirectory for strategy source files.
const STRATEGIES_DIR: &str = "strategies";

/// Errors from config injection.
#[derive(Debug, Error)]
pub enum InjectError {
    /// Bot or run id contains path-hostile characters or is empty.
    #[error("invalid workload id: {0:?}")]
    InvalidId(String),

    /// A directory could not be created.
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A config or strategy file could not be written.
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A file or namespace could not be removed.
    #[error("failed to remove {path}: {source}")]
    Remove {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A config layer could not be serialized.
    #[error("failed to serialize {layer} config: {source}")]
    Serialize {
        layer: &'static str,
        source: serde_json::Error,
    },
}

/// One layered config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLayer {
    Exchange,
    Strategy,
    Bot,
    Secure,
}

impl ConfigLayer {
    /// On-disk filename of this layer.
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Exchange => "config.exchange.json",
            Self::Strategy => "config.strategy.json",
            Self::Bot => "config.bot.json",
            Self::Secure => "config.secure.json",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Exchange => "exchange",
            Self::Strategy => "strategy",
            Self::Bot => "bot",
            Self::Secure => "secure",
        }
    }
}

/// Paths produced by one `write_bot_files` call.
///
/// Ephemeral: built during creation, turned into `--config` arguments,
/// then discarded. The paths are valid both on the manager side and
/// inside the container because the shared volume mounts at the same
/// absolute path on both.
#[derive(Debug, Clone)]
pub struct ConfigFilePaths {
    /// Exchange layer, when the spec supplied one.
    pub exchange: Option<PathBuf>,
    /// Strategy layer, when the spec supplied one.
    pub strategy: Option<PathBuf>,
    /// Workload layer, when the spec supplied one.
    pub bot: Option<PathBuf>,
    /// System-forced layer. Always written.
    pub secure: PathBuf,
    /// Strategy source file under `strategies/`.
    pub strategy_file: PathBuf,
}

impl ConfigFilePaths {
    /// `--config` arguments in merge precedence order.
    ///
    /// The trading process merges left to right with later files
    /// winning, so the secure layer is always referenced last.
    pub fn config_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        let layers = [
            self.exchange.as_deref(),
            self.strategy.as_deref(),
            self.bot.as_deref(),
            Some(self.secure.as_path()),
        ];
        for path in layers.into_iter().flatten() {
            args.push("--config".to_string());
            args.push(path.display().to_string());
        }
        args
    }
}

/// Paths produced by one `write_run_files` call.
///
/// Isolated runs carry no secure layer and no API server; only the
/// tenant config layers and the strategy source are materialized, all
/// inside the run's workspace.
#[derive(Debug, Clone)]
pub struct RunFilePaths {
    /// The run's workspace directory, `{base}/{run_id}`.
    pub workspace: PathBuf,
    /// Exchange layer, when the spec supplied one.
    pub exchange: Option<PathBuf>,
    /// Strategy layer, when the spec supplied one.
    pub strategy: Option<PathBuf>,
    /// Strategy source file under `strategies/`.
    pub strategy_file: PathBuf,
}

impl RunFilePaths {
    /// `--config` arguments in merge precedence order.
    pub fn config_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        for path in [self.exchange.as_deref(), self.strategy.as_deref()]
            .into_iter()
            .flatten()
        {
            args.push("--config".to_string());
            args.push(path.display().to_string());
        }
        args
    }
}

/// Writes layered config and strategy files into the shared volume,
/// namespaced by bot id.
#[derive(Debug, Clone)]
pub struct ConfigInjector {
    base_dir: PathBuf,
}

impl ConfigInjector {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Root of the shared volume.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Namespace directory for one bot.
    pub fn bot_dir(&self, bot_id: &str) -> PathBuf {
        self.base_dir.join(bot_id)
    }

    /// Write every config file the spec calls for.
    ///
    /// Only layers present in the spec are written; the secure layer is
    /// always written, and written last. If anything fails, every file
    /// already written for this bot id is removed before the error
    /// returns.
    pub async fn write_bot_files(
        &self,
        spec: &WorkloadSpec,
    ) -> Result<ConfigFilePaths, InjectError> {
        if !is_safe_id(&spec.bot_id) {
            return Err(InjectError::InvalidId(spec.bot_id.clone()));
        }

        let bot_dir = self.bot_dir(&spec.bot_id);
        match self.write_all(spec, &bot_dir).await {
            Ok(paths) => {
                debug!(bot_id = %spec.bot_id, dir = %bot_dir.display(), "config files written");
                Ok(paths)
            }
            Err(err) => {
                if let Err(cleanup_err) = remove_dir_if_present(&bot_dir).await {
                    warn!(
                        bot_id = %spec.bot_id,
                        error = %cleanup_err,
                        "cleanup after failed config write also failed"
                    );
                }
                Err(err)
            }
        }
    }

    async fn write_all(
        &self,
        spec: &WorkloadSpec,
        bot_dir: &Path,
    ) -> Result<ConfigFilePaths, InjectError> {
        let strategies_dir = bot_dir.join(STRATEGIES_DIR);
        create_dir_all(&strategies_dir).await?;

        let mut exchange = None;
        let mut strategy = None;
        let mut bot = None;

        if !spec.exchange_config.is_empty() {
            exchange =
                Some(write_layer_file(bot_dir, ConfigLayer::Exchange, &spec.exchange_config).await?);
        }
        if !spec.strategy_config.is_empty() {
            strategy =
                Some(write_layer_file(bot_dir, ConfigLayer::Strategy, &spec.strategy_config).await?);
        }
        if !spec.bot_config.is_empty() {
            bot = Some(write_layer_file(bot_dir, ConfigLayer::Bot, &spec.bot_config).await?);
        }

        let strategy_file = strategies_dir.join(strategy_filename(&spec.strategy_name));
        write_text(&strategy_file, &spec.strategy_source).await?;

        // Secure layer last, so a partial namespace can never contain
        // it without the tenant layers it is meant to override.
        let secure =
            write_layer_file(bot_dir, ConfigLayer::Secure, &secure_config(spec.api_port)).await?;

        Ok(ConfigFilePaths {
            exchange,
            strategy,
            bot,
            secure,
            strategy_file,
        })
    }

    /// Write an isolated run's workspace: tenant config layers and the
    /// strategy source, no secure layer. All-or-nothing like
    /// [`write_bot_files`](Self::write_bot_files).
    pub async fn write_run_files(
        &self,
        run_id: &str,
        spec: &BacktestSpec,
    ) -> Result<RunFilePaths, InjectError> {
        if !is_safe_id(run_id) {
            return Err(InjectError::InvalidId(run_id.to_string()));
        }

        let workspace = self.bot_dir(run_id);
        match self.write_run_all(spec, &workspace).await {
            Ok(paths) => {
                debug!(run_id = %run_id, dir = %workspace.display(), "run files written");
                Ok(paths)
            }
            Err(err) => {
                if let Err(cleanup_err) = remove_dir_if_present(&workspace).await {
                    warn!(
                        run_id = %run_id,
                        error = %cleanup_err,
                        "cleanup after failed run write also failed"
                    );
                }
                Err(err)
            }
        }
    }

    async fn write_run_all(
        &self,
        spec: &BacktestSpec,
        workspace: &Path,
    ) -> Result<RunFilePaths, InjectError> {
        let strategies_dir = workspace.join(STRATEGIES_DIR);
        create_dir_all(&strategies_dir).await?;

        let mut exchange = None;
        let mut strategy = None;

        if !spec.exchange_config.is_empty() {
            exchange =
                Some(write_layer_file(workspace, ConfigLayer::Exchange, &spec.exchange_config).await?);
        }
        if !spec.strategy_config.is_empty() {
            strategy =
                Some(write_layer_file(workspace, ConfigLayer::Strategy, &spec.strategy_config).await?);
        }

        let strategy_file = strategies_dir.join(strategy_filename(&spec.strategy_name));
        write_text(&strategy_file, &spec.strategy_source).await?;

        Ok(RunFilePaths {
            workspace: workspace.to_path_buf(),
            exchange,
            strategy,
            strategy_file,
        })
    }

    /// Rewrite a single layer in place, for updates to an existing
    /// workload.
    pub async fn write_layer(
        &self,
        bot_id: &str,
        layer: ConfigLayer,
        config: &ConfigMap,
    ) -> Result<PathBuf, InjectError> {
        if !is_safe_id(bot_id) {
            return Err(InjectError::InvalidId(bot_id.to_string()));
        }

        let bot_dir = self.bot_dir(bot_id);
        create_dir_all(&bot_dir).await?;
        write_layer_file(&bot_dir, layer, config).await
    }

    /// Remove a bot's whole config namespace. Missing namespaces are
    /// fine; delete must be idempotent.
    pub async fn delete_bot_files(&self, bot_id: &str) -> Result<(), InjectError> {
        if !is_safe_id(bot_id) {
            return Err(InjectError::InvalidId(bot_id.to_string()));
        }

        let bot_dir = self.bot_dir(bot_id);
        remove_dir_if_present(&bot_dir).await?;
        debug!(bot_id = %bot_id, "config namespace removed");
        Ok(())
    }
}

/// System-forced configuration: the API server pinned to the spec's
/// port on all interfaces, and the bot starting in the running state.
fn secure_config(api_port: u16) -> ConfigMap {
    serde_json::json!({
        "api_server": {
            "enabled": true,
            "listen_ip_address": "0.0.0.0",
            "listen_port": api_port,
        },
        "initial_state": "running",
    })
    .as_object()
    .cloned()
    .unwrap_or_default()
}

async fn write_layer_file(
    bot_dir: &Path,
    layer: ConfigLayer,
    config: &ConfigMap,
) -> Result<PathBuf, InjectError> {
    let path = bot_dir.join(layer.file_name());
    let body = serde_json::to_vec_pretty(config).map_err(|source| InjectError::Serialize {
        layer: layer.label(),
        source,
    })?;
    tokio::fs::write(&path, body)
        .await
        .map_err(|source| InjectError::Write {
            path: path.clone(),
            source,
        })?;
    Ok(path)
}

async fn write_text(path: &Path, content: &str) -> Result<(), InjectError> {
    tokio::fs::write(path, content)
        .await
        .map_err(|source| InjectError::Write {
            path: path.to_path_buf(),
            source,
        })
}

async fn create_dir_all(path: &Path) -> Result<(), InjectError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|source| InjectError::CreateDir {
            path: path.to_path_buf(),
            source,
        })
}

async fn remove_dir_if_present(path: &Path) -> Result<(), InjectError> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(InjectError::Remove {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use model::ResourceLimits;

    use super::*;

    fn spec(bot_id: &str) -> WorkloadSpec {
        WorkloadSpec {
            bot_id: bot_id.to_string(),
            name: "Alpha One".to_string(),
            image: "trader:latest".to_string(),
            strategy_name: "RSI Test Strategy".to_string(),
            strategy_source: "class RsiTestStrategy:\n    pass\n".to_string(),
            exchange_config: map(r#"{"exchange": {"name": "binance"}}"#),
            strategy_config: map(r#"{"timeframe": "5m"}"#),
            bot_config: map(r#"{"max_open_trades": 3, "api_server": {"enabled": false}}"#),
            resources: ResourceLimits::default(),
            network_mode: None,
            api_port: 8080,
            env: BTreeMap::new(),
            data_download_url: None,
        }
    }

    fn map(raw: &str) -> ConfigMap {
        serde_json::from_str(raw).unwrap()
    }

    async fn read_json(path: &Path) -> ConfigMap {
        let raw = tokio::fs::read_to_string(path).await.unwrap();
        serde_json::from_str(&raw).unwrap()
    }

    #[tokio::test]
    async fn test_write_all_layers_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let injector = ConfigInjector::new(dir.path());

        let spec = spec("alpha-1");
        let paths = injector.write_bot_files(&spec).await.unwrap();

        let exchange = read_json(paths.exchange.as_ref().unwrap()).await;
        assert_eq!(exchange, spec.exchange_config);

        let secure = read_json(&paths.secure).await;
        assert_eq!(secure["api_server"]["listen_port"], 8080);
        assert_eq!(secure["api_server"]["enabled"], true);
        assert_eq!(secure["initial_state"], "running");

        let source = tokio::fs::read_to_string(&paths.strategy_file).await.unwrap();
        assert_eq!(source, spec.strategy_source);
        assert!(paths
            .strategy_file
            .to_string_lossy()
            .ends_with("strategies/RsiTestStrategy.py"));
    }

    #[tokio::test]
    async fn test_config_args_order_secure_last() {
        let dir = tempfile::tempdir().unwrap();
        let injector = ConfigInjector::new(dir.path());

        let paths = injector.write_bot_files(&spec("alpha-2")).await.unwrap();
        let args = paths.config_args();

        let files: Vec<&str> = args
            .iter()
            .filter(|arg| !arg.starts_with("--"))
            .map(|arg| arg.rsplit('/').next().unwrap())
            .collect();
        assert_eq!(
            files,
            [
                "config.exchange.json",
                "config.strategy.json",
                "config.bot.json",
                "config.secure.json"
            ]
        );
        assert_eq!(args.iter().filter(|arg| *arg == "--config").count(), 4);
    }

    #[tokio::test]
    async fn test_absent_layers_are_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let injector = ConfigInjector::new(dir.path());

        let mut spec = spec("alpha-3");
        spec.exchange_config = ConfigMap::new();
        spec.strategy_config = ConfigMap::new();
        spec.bot_config = ConfigMap::new();

        let paths = injector.write_bot_files(&spec).await.unwrap();
        assert!(paths.exchange.is_none());
        assert!(paths.strategy.is_none());
        assert!(paths.bot.is_none());
        assert!(!injector.bot_dir("alpha-3").join("config.exchange.json").exists());

        let args = paths.config_args();
        assert_eq!(args.len(), 2);
        assert!(args[1].ends_with("config.secure.json"));
    }

    #[tokio::test]
    async fn test_failed_write_leaves_zero_residual_files() {
        let dir = tempfile::tempdir().unwrap();
        let injector = ConfigInjector::new(dir.path());
        let spec = spec("alpha-4");

        // Occupy the secure layer's path with a directory so the final
        // write fails after every other file has succeeded.
        let secure_path = injector.bot_dir("alpha-4").join("config.secure.json");
        tokio::fs::create_dir_all(&secure_path).await.unwrap();

        let err = injector.write_bot_files(&spec).await.unwrap_err();
        assert!(matches!(err, InjectError::Write { .. }));
        assert!(!injector.bot_dir("alpha-4").exists());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let injector = ConfigInjector::new(dir.path());

        injector.write_bot_files(&spec("alpha-5")).await.unwrap();
        assert!(injector.bot_dir("alpha-5").exists());

        injector.delete_bot_files("alpha-5").await.unwrap();
        assert!(!injector.bot_dir("alpha-5").exists());

        // Second delete of a missing namespace succeeds.
        injector.delete_bot_files("alpha-5").await.unwrap();
    }

    #[tokio::test]
    async fn test_path_hostile_ids_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let injector = ConfigInjector::new(dir.path());

        let mut spec = spec("ok");
        spec.bot_id = "../escape".to_string();
        assert!(matches!(
            injector.write_bot_files(&spec).await,
            Err(InjectError::InvalidId(_))
        ));
        assert!(matches!(
            injector.delete_bot_files("a/b").await,
            Err(InjectError::InvalidId(_))
        ));
    }

    #[tokio::test]
    async fn test_run_files_have_no_secure_layer() {
        let dir = tempfile::tempdir().unwrap();
        let injector = ConfigInjector::new(dir.path());

        let spec = BacktestSpec {
            strategy_name: "RSI Test Strategy".to_string(),
            strategy_source: "class RsiTestStrategy:\n    pass\n".to_string(),
            image: "trader:latest".to_string(),
            exchange_config: map(r#"{"exchange": {"name": "binance"}}"#),
            strategy_config: map(r#"{"timeframe": "5m"}"#),
            timerange: None,
        };

        let paths = injector.write_run_files("bt-7f3a", &spec).await.unwrap();
        assert_eq!(paths.workspace, injector.bot_dir("bt-7f3a"));
        assert!(paths.workspace.to_string_lossy().contains("bt-7f3a"));
        assert!(!paths.workspace.join("config.secure.json").exists());
        assert!(paths
            .strategy_file
            .to_string_lossy()
            .ends_with("strategies/RsiTestStrategy.py"));

        let args = paths.config_args();
        assert_eq!(args.len(), 4);
        assert!(args[1].ends_with("config.exchange.json"));
        assert!(args[3].ends_with("config.strategy.json"));
    }

    #[tokio::test]
    async fn test_write_layer_overwrites_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let injector = ConfigInjector::new(dir.path());

        injector.write_bot_files(&spec("alpha-6")).await.unwrap();
        let path = injector
            .write_layer("alpha-6", ConfigLayer::Bot, &map(r#"{"max_open_trades": 9}"#))
            .await
            .unwrap();

        let updated = read_json(&path).await;
        assert_eq!(updated["max_open_trades"], 9);
        assert!(updated.get("api_server").is_none());
    }
}
