//! Operator CLI for botfleet backends.
//!
//! Resolves the backend named by the `backend` tag in `botctl.toml`,
//! connects through the runtime registry, and exposes one subcommand
//! per contract operation. Log verbosity follows `RUST_LOG`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use model::{BacktestSpec, DataDownloadSpec, LogOptions, UpdateBotSpec, WorkloadSpec};
use runtime_core::{
    connect_backtest_runner, connect_data_downloader, connect_runtime, BackendConfig, BackendKind,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Manage trading-bot workloads on a container runtime.
#[derive(Parser)]
#[command(name = "botctl")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the backend configuration file.
    #[arg(short, long, global = true, default_value = "botctl.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create and start a bot from a workload spec file
    Create {
        /// Path to the workload spec (JSON)
        #[arg(long)]
        spec: PathBuf,
    },
    /// Start a stopped bot
    Start { bot_id: String },
    /// Stop a running bot
    Stop { bot_id: String },
    /// Restart a bot
    Restart { bot_id: String },
    /// Stop and remove a bot together with its config files
    Delete { bot_id: String },
    /// Show a bot's status
    Status { bot_id: String },
    /// List every managed bot
    List,
    /// Fetch a bot's logs
    Logs {
        bot_id: String,
        /// Only the last N lines
        #[arg(long)]
        tail: Option<u32>,
        /// Only lines after this Unix timestamp
        #[arg(long)]
        since: Option<i64>,
        /// Prefix each line with its timestamp
        #[arg(long)]
        timestamps: bool,
    },
    /// Print a bot's container IP address
    Ip { bot_id: String },
    /// Print the reachable base URL of a bot's API
    Url { bot_id: String },
    /// Probe a bot's API ping endpoint
    Ping { bot_id: String },
    /// Apply a config or resource update to a bot
    Update {
        bot_id: String,
        /// Path to the update spec (JSON)
        #[arg(long)]
        spec: PathBuf,
    },
    /// Start an ephemeral market-data download task
    Download {
        /// Path to the download spec (JSON)
        #[arg(long)]
        spec: PathBuf,
    },
    /// Show a download task's status
    DownloadStatus { task_id: String },
    /// Print a completed task's data-availability report
    DownloadReport { task_id: String },
    /// Remove a finished download task's container
    DownloadCleanup { task_id: String },
    /// Start an isolated backtest run
    Backtest {
        /// Path to the backtest spec (JSON)
        #[arg(long)]
        spec: PathBuf,
    },
    /// Show a backtest run's status
    BacktestStatus { run_id: String },
    /// Fetch a backtest run's logs
    BacktestLogs {
        run_id: String,
        /// Only the last N lines
        #[arg(long)]
        tail: Option<u32>,
    },
    /// Remove a backtest run's container and workspace
    BacktestCleanup { run_id: String },
    /// Check that the backend's engine is reachable
    Health,
}

/// On-disk shape of `botctl.toml`.
#[derive(Debug, Deserialize)]
struct CliConfig {
    /// Tag of a registered backend, e.g. `"docker"`.
    backend: String,
    /// Settings handed to the backend untouched.
    #[serde(default)]
    backend_config: toml::Table,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    common::init_logging();
    runtime_docker::register();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let (kind, mut backend_config) = load_config(&cli.config)?;
    debug!(backend = %kind, config = %cli.config.display(), "backend configuration loaded");

    // Env-supplied registry credentials fill in only when the config
    // file carries none; an explicit registry_auth table wins.
    if !backend_config.contains_key("registry_auth") {
        if let Ok(creds) = auth::RegistryCredentials::from_env() {
            debug!(username = creds.username(), "registry credentials loaded from environment");
            backend_config.insert("registry_auth".into(), serde_json::to_value(&creds)?);
        }
    }

    dispatch(cli.command, kind, backend_config).await
}

async fn dispatch(command: Command, kind: BackendKind, config: BackendConfig) -> Result<()> {
    match command {
        Command::Create { spec } => {
            let spec: WorkloadSpec = read_spec(&spec)?;
            let runtime = connect_runtime(kind, config).await?;
            let container_id = runtime.create_bot(&spec).await?;
            println!("{container_id}");
        }
        Command::Start { bot_id } => {
            let runtime = connect_runtime(kind, config).await?;
            runtime.start_bot(&bot_id).await?;
            println!("started {bot_id}");
        }
        Command::Stop { bot_id } => {
            let runtime = connect_runtime(kind, config).await?;
            runtime.stop_bot(&bot_id).await?;
            println!("stopped {bot_id}");
        }
        Command::Restart { bot_id } => {
            let runtime = connect_runtime(kind, config).await?;
            runtime.restart_bot(&bot_id).await?;
            println!("restarted {bot_id}");
        }
        Command::Delete { bot_id } => {
            let runtime = connect_runtime(kind, config).await?;
            runtime.delete_bot(&bot_id).await?;
            println!("deleted {bot_id}");
        }
        Command::Status { bot_id } => {
            let runtime = connect_runtime(kind, config).await?;
            print_json(&runtime.bot_status(&bot_id).await?)?;
        }
        Command::List => {
            let runtime = connect_runtime(kind, config).await?;
            print_json(&runtime.list_bots().await?)?;
        }
        Command::Logs {
            bot_id,
            tail,
            since,
            timestamps,
        } => {
            let opts = LogOptions {
                tail,
                since,
                timestamps,
            };
            let runtime = connect_runtime(kind, config).await?;
            print!("{}", runtime.bot_logs(&bot_id, &opts).await?);
        }
        Command::Ip { bot_id } => {
            let runtime = connect_runtime(kind, config).await?;
            println!("{}", runtime.container_ip(&bot_id).await?);
        }
        Command::Url { bot_id } => {
            let runtime = connect_runtime(kind, config).await?;
            println!("{}", runtime.bot_api_url(&bot_id).await?);
        }
        Command::Ping { bot_id } => {
            let runtime = connect_runtime(kind, config).await?;
            let client = runtime.bot_api_client(&bot_id).await?;
            client.ping().await?;
            println!("{} ok", client.base_url());
        }
        Command::Update { bot_id, spec } => {
            let update: UpdateBotSpec = read_spec(&spec)?;
            let runtime = connect_runtime(kind, config).await?;
            runtime.update_bot(&bot_id, &update).await?;
            println!("updated {bot_id}");
        }
        Command::Download { spec } => {
            let spec: DataDownloadSpec = read_spec(&spec)?;
            let downloader = connect_data_downloader(kind, config).await?;
            println!("{}", downloader.start(&spec).await?);
        }
        Command::DownloadStatus { task_id } => {
            let downloader = connect_data_downloader(kind, config).await?;
            print_json(&downloader.status(&task_id).await?)?;
        }
        Command::DownloadReport { task_id } => {
            let downloader = connect_data_downloader(kind, config).await?;
            print_json(&downloader.report(&task_id).await?)?;
        }
        Command::DownloadCleanup { task_id } => {
            let downloader = connect_data_downloader(kind, config).await?;
            downloader.cleanup(&task_id).await?;
            println!("removed {task_id}");
        }
        Command::Backtest { spec } => {
            let spec: BacktestSpec = read_spec(&spec)?;
            let runner = connect_backtest_runner(kind, config).await?;
            print_json(&runner.run(&spec).await?)?;
        }
        Command::BacktestStatus { run_id } => {
            let runner = connect_backtest_runner(kind, config).await?;
            print_json(&runner.status(&run_id).await?)?;
        }
        Command::BacktestLogs { run_id, tail } => {
            let opts = LogOptions {
                tail,
                ..Default::default()
            };
            let runner = connect_backtest_runner(kind, config).await?;
            print!("{}", runner.logs(&run_id, &opts).await?);
        }
        Command::BacktestCleanup { run_id } => {
            let runner = connect_backtest_runner(kind, config).await?;
            runner.cleanup(&run_id).await?;
            println!("removed {run_id}");
        }
        Command::Health => {
            let runtime = connect_runtime(kind, config).await?;
            runtime.health_check().await?;
            println!("ok");
        }
    }
    Ok(())
}

/// Read `botctl.toml` and resolve its backend tag against the registry.
fn load_config(path: &Path) -> Result<(BackendKind, BackendConfig)> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let parsed: CliConfig =
        toml::from_str(&raw).with_context(|| format!("invalid config file {}", path.display()))?;

    let kind = BackendKind::resolve(&parsed.backend)?;
    let serde_json::Value::Object(backend_config) = serde_json::to_value(parsed.backend_config)?
    else {
        bail!("backend_config must be a table");
    };
    Ok((kind, backend_config))
}

fn read_spec<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid spec file {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
