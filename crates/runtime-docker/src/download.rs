//! Disposable data-refresh tasks.
//!
//! A download task is one throwaway container running a generated
//! shell script: fetch the prior bundle (best effort), run one
//! download per exchange, archive and upload the dataset, then scan
//! the files on disk and print the availability report between fixed
//! log markers. All task state lives in the container; the manager
//! derives status and progress from inspection and logs.

use async_trait::async_trait;
use common::is_safe_id;
use engine_client::{
    ContainerCreateRequest, ContainerInspect, EngineClient, HostConfig, LogsQuery, RestartPolicy,
};
use model::{
    DataAvailability, DataDownloadSpec, DataDownloadStatus, DownloadState, ExchangeDownload,
    DATA_REPORT_BEGIN, DATA_REPORT_END,
};
use runtime_core::{DataDownloader, ErrorKind, RuntimeError};
use tracing::{debug, info, warn};

use crate::command::{sh_join, sh_quote, TRADER_BIN};
use crate::config::DockerConfig;
use crate::errors::engine_err;
use crate::naming::{container_name, new_task_id, task_labels, LABEL_TASK_TOTAL};
use crate::provision::ensure_image;
use crate::status::{failure_detail, task_phase, TaskPhase};

/// Where the script accumulates candle files inside the container.
const DATA_DIR: &str = "/data";

/// Line the script prints after each finished exchange; progress is
/// the count of these against the exchange total label.
pub(crate) const EXCHANGE_DONE_MARKER: &str = "-----EXCHANGE COMPLETE-----";

/// Runs download tasks as one-shot containers on a Docker daemon.
pub struct DockerDataDownloader {
    engine: EngineClient,
    config: DockerConfig,
}

impl DockerDataDownloader {
    /// Build a downloader for the daemon in `config` without touching
    /// the network.
    pub fn new(config: DockerConfig) -> Result<Self, RuntimeError> {
        config.validate()?;
        let addr = config.daemon_addr()?;
        let engine = EngineClient::new(&addr, config.tls.as_ref(), &config.api_version)
            .map_err(|err| engine_err("connect_data_downloader", None, err))?;
        Ok(Self { engine, config })
    }

    /// Build a downloader and verify the daemon answers.
    pub async fn connect(config: DockerConfig) -> Result<Self, RuntimeError> {
        let downloader = Self::new(config)?;
        downloader
            .engine
            .ping()
            .await
            .map_err(|err| engine_err("connect_data_downloader", None, err))?;
        Ok(downloader)
    }

    async fn inspect_task(
        &self,
        op: &'static str,
        task_id: &str,
    ) -> Result<ContainerInspect, RuntimeError> {
        if !is_safe_id(task_id) {
            return Err(RuntimeError::not_found(op, task_id));
        }
        match self.engine.inspect_container(&container_name(task_id)).await {
            Ok(inspect) => Ok(inspect),
            Err(err) if err.is_not_found() => Err(RuntimeError::not_found(op, task_id)),
            Err(err) => Err(engine_err(op, Some(task_id), err)),
        }
    }

    /// Marker-counted progress; a failed log fetch degrades to 0.
    async fn logged_progress(&self, container_id: &str, total: u32) -> f32 {
        match self
            .engine
            .container_logs(container_id, &LogsQuery::default())
            .await
        {
            Ok(logs) => marker_progress(&logs, total),
            Err(err) => {
                debug!(error = %err, "progress read failed");
                0.0
            }
        }
    }
}

#[async_trait]
impl DataDownloader for DockerDataDownloader {
    async fn start(&self, spec: &DataDownloadSpec) -> Result<String, RuntimeError> {
        const OP: &str = "start_download";

        if spec.exchanges.is_empty() {
            return Err(RuntimeError::invalid_config(
                OP,
                "download spec names no exchanges",
            ));
        }
        if spec.upload_url.is_empty() {
            return Err(RuntimeError::invalid_config(OP, "upload_url is required"));
        }

        ensure_image(OP, &self.engine, &self.config, &spec.image).await?;

        let task_id = new_task_id();
        let script = build_download_script(spec);
        let mut labels = task_labels(&task_id);
        labels.insert(LABEL_TASK_TOTAL.to_string(), spec.exchanges.len().to_string());

        let request = ContainerCreateRequest {
            image: spec.image.clone(),
            entrypoint: Some(vec!["sh".to_string(), "-c".to_string(), script]),
            // An explicit empty Cmd keeps the image's default CMD from
            // being appended to the entrypoint.
            cmd: Some(Vec::new()),
            labels,
            host_config: HostConfig {
                restart_policy: Some(RestartPolicy::no()),
                ..HostConfig::default()
            },
            ..ContainerCreateRequest::default()
        };

        let created = self
            .engine
            .create_container(&container_name(&task_id), &request)
            .await
            .map_err(|err| engine_err(OP, Some(&task_id), err))?;

        if let Err(err) = self.engine.start_container(&created.id).await {
            let err = engine_err(OP, Some(&task_id), err);
            // No config files exist for tasks; removing the container
            // is the whole rollback.
            if let Err(remove_err) = self.engine.remove_container(&created.id, true).await {
                warn!(task_id = %task_id, error = %remove_err, "rollback of unstarted task failed");
            }
            return Err(err);
        }

        info!(
            task_id = %task_id,
            exchanges = spec.exchanges.len(),
            image = %spec.image,
            "download task started"
        );
        Ok(task_id)
    }

    async fn status(&self, task_id: &str) -> Result<DataDownloadStatus, RuntimeError> {
        const OP: &str = "download_status";
        let inspect = self.inspect_task(OP, task_id).await?;
        let total = inspect
            .label(LABEL_TASK_TOTAL)
            .and_then(|raw| raw.parse::<u32>().ok())
            .unwrap_or(0);

        let (state, progress, error) = match task_phase(&inspect.state) {
            TaskPhase::Pending => (DownloadState::Pending, 0.0, None),
            TaskPhase::Running => {
                let progress = self.logged_progress(&inspect.id, total).await;
                (DownloadState::Downloading, progress, None)
            }
            TaskPhase::Completed => (DownloadState::Completed, 1.0, None),
            TaskPhase::Failed(code) => {
                let progress = self.logged_progress(&inspect.id, total).await;
                let error = failure_detail(&self.engine, &inspect.id, code).await;
                (DownloadState::Failed, progress, Some(error))
            }
        };

        Ok(DataDownloadStatus {
            task_id: task_id.to_string(),
            state,
            progress,
            error,
        })
    }

    async fn report(&self, task_id: &str) -> Result<DataAvailability, RuntimeError> {
        const OP: &str = "download_report";
        let inspect = self.inspect_task(OP, task_id).await?;

        let phase = task_phase(&inspect.state);
        if phase != TaskPhase::Completed {
            return Err(RuntimeError::new(OP, ErrorKind::Internal)
                .with_bot(task_id)
                .with_message(format!("task has not completed (state: {})", phase.as_str())));
        }

        let logs = self
            .engine
            .container_logs(&inspect.id, &LogsQuery::default())
            .await
            .map_err(|err| engine_err(OP, Some(task_id), err))?;
        parse_report(OP, task_id, &logs)
    }

    async fn cleanup(&self, task_id: &str) -> Result<(), RuntimeError> {
        const OP: &str = "download_cleanup";
        if !is_safe_id(task_id) {
            return Err(RuntimeError::not_found(OP, task_id));
        }
        match self
            .engine
            .remove_container(&container_name(task_id), true)
            .await
        {
            Ok(()) => {
                info!(task_id = %task_id, "download task removed");
                Ok(())
            }
            // Cleanup of an already-removed task succeeds.
            Err(err) if err.is_not_found() => Ok(()),
            Err(err) => Err(engine_err(OP, Some(task_id), err)),
        }
    }
}

/// The task container's whole job as one `sh -c` script.
pub(crate) fn build_download_script(spec: &DataDownloadSpec) -> String {
    let mut lines = vec!["set -e".to_string(), format!("mkdir -p {}", DATA_DIR)];

    if let Some(prior) = &spec.prior_data_url {
        // Best effort; a missing or broken prior bundle means a cold
        // start, not a failure.
        lines.push(format!(
            "(curl -fsSL {url} -o /tmp/prior.tar.gz && tar -xzf /tmp/prior.tar.gz -C {dir}) \
             || echo 'no prior bundle, starting cold'",
            url = sh_quote(prior),
            dir = DATA_DIR,
        ));
    }

    for exchange in &spec.exchanges {
        lines.push(download_invocation(exchange));
        lines.push(format!("echo {}", sh_quote(EXCHANGE_DONE_MARKER)));
    }

    lines.push(format!("tar -czf /tmp/bundle.tar.gz -C {} .", DATA_DIR));
    lines.push(format!(
        "curl -fsS -T /tmp/bundle.tar.gz {}",
        sh_quote(&spec.upload_url)
    ));
    lines.push(report_scanner());

    lines.join("\n")
}

fn download_invocation(exchange: &ExchangeDownload) -> String {
    let mut words = vec![
        TRADER_BIN.to_string(),
        "download-data".to_string(),
        "--datadir".to_string(),
        DATA_DIR.to_string(),
        "--exchange".to_string(),
        exchange.exchange.clone(),
        "--pairs".to_string(),
        exchange.pair_pattern.clone(),
        "--days".to_string(),
        exchange.days.to_string(),
        "--trading-mode".to_string(),
        exchange.trading_mode.as_arg().to_string(),
        "--timeframes".to_string(),
    ];
    words.extend(exchange.timeframes.iter().cloned());
    sh_join(&words)
}

/// Python snippet that derives the availability report from the files
/// actually on disk. Candle files are `{PAIR}-{timeframe}.json` arrays
/// of rows whose first column is a millisecond timestamp; the date
/// range comes from the first and last row, not the filename.
fn report_scanner() -> String {
    format!(
        r#"python3 - <<'PYEOF'
import json, os
from datetime import datetime, timezone

root = {root:?}


def day(ms):
    return datetime.fromtimestamp(ms / 1000, tz=timezone.utc).strftime('%Y-%m-%d')


exchanges = []
for exchange in sorted(os.listdir(root)):
    directory = os.path.join(root, exchange)
    if not os.path.isdir(directory):
        continue
    pairs = {{}}
    for name in sorted(os.listdir(directory)):
        if not name.endswith('.json'):
            continue
        stem, sep, timeframe = name[:-5].rpartition('-')
        if not sep:
            continue
        try:
            with open(os.path.join(directory, name)) as handle:
                rows = json.load(handle)
        except (ValueError, OSError):
            continue
        if not rows:
            continue
        pair = stem.replace('_', '/')
        pairs.setdefault(pair, []).append(
            {{'timeframe': timeframe, 'from': day(rows[0][0]), 'to': day(rows[-1][0])}}
        )
    if pairs:
        exchanges.append({{
            'name': exchange,
            'pairs': [{{'pair': p, 'timeframes': t}} for p, t in pairs.items()],
        }})

print({begin:?})
print(json.dumps({{'exchanges': exchanges}}))
print({end:?})
PYEOF"#,
        root = DATA_DIR,
        begin = DATA_REPORT_BEGIN,
        end = DATA_REPORT_END,
    )
}

/// Fraction of exchanges done, counted from the per-exchange markers.
pub(crate) fn marker_progress(logs: &str, total: u32) -> f32 {
    if total == 0 {
        return 0.0;
    }
    let done = logs
        .lines()
        .filter(|line| line.trim() == EXCHANGE_DONE_MARKER)
        .count();
    (done as f32 / total as f32).clamp(0.0, 1.0)
}

/// Extract and parse the availability report between the log markers.
/// When the task printed more than one report, the last one wins.
pub(crate) fn parse_report(
    op: &'static str,
    task_id: &str,
    logs: &str,
) -> Result<DataAvailability, RuntimeError> {
    let mut section: Option<String> = None;
    let mut report: Option<String> = None;

    for line in logs.lines() {
        let trimmed = line.trim();
        if trimmed == DATA_REPORT_BEGIN {
            section = Some(String::new());
        } else if trimmed == DATA_REPORT_END {
            if let Some(body) = section.take() {
                report = Some(body);
            }
        } else if let Some(body) = section.as_mut() {
            body.push_str(line);
            body.push('\n');
        }
    }

    let body = report.ok_or_else(|| {
        RuntimeError::new(op, ErrorKind::Internal)
            .with_bot(task_id)
            .with_message("no availability report in task output")
    })?;

    serde_json::from_str(&body).map_err(|err| {
        RuntimeError::new(op, ErrorKind::Internal)
            .with_bot(task_id)
            .with_message("availability report is not valid JSON")
            .with_source(err)
    })
}
