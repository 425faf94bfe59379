//! Container names, labels and id generation.
//!
//! Everything this backend creates is namespaced: a deterministic
//! `botfleet-{id}` container name plus labels that scope list and
//! filter queries, so unrelated containers on the same daemon are
//! never touched.

use std::collections::BTreeMap;

use uuid::Uuid;

/// Label carrying the workload id.
pub const LABEL_BOT_ID: &str = "botfleet.bot.id";
/// Label carrying the workload display name.
pub const LABEL_BOT_NAME: &str = "botfleet.bot.name";
/// Marker label scoping list queries to managed bots.
pub const LABEL_MANAGED: &str = "botfleet.managed";
/// Label carrying an ephemeral task or run id.
pub const LABEL_TASK_ID: &str = "botfleet.task.id";
/// Label carrying the number of exchanges a download task covers.
pub const LABEL_TASK_TOTAL: &str = "botfleet.task.exchanges";

const NAME_PREFIX: &str = "botfleet-";

/// Deterministic container name for a workload, task or run id.
pub fn container_name(id: &str) -> String {
    format!("{}{}", NAME_PREFIX, id)
}

/// Recover the id from a deterministic container name.
pub fn id_from_container_name(name: &str) -> Option<&str> {
    name.trim_start_matches('/').strip_prefix(NAME_PREFIX)
}

/// Fresh download task id.
pub fn new_task_id() -> String {
    format!("dl-{}", Uuid::new_v4().simple())
}

/// Fresh backtest run id.
pub fn new_run_id() -> String {
    format!("bt-{}", Uuid::new_v4().simple())
}

/// Labels applied to a managed bot container.
pub fn bot_labels(bot_id: &str, name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_BOT_ID.to_string(), bot_id.to_string()),
        (LABEL_BOT_NAME.to_string(), name.to_string()),
        (LABEL_MANAGED.to_string(), "true".to_string()),
    ])
}

/// Labels applied to an ephemeral task container. Tasks do not carry
/// the managed marker, so bot listings never see them.
pub fn task_labels(task_id: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(LABEL_TASK_ID.to_string(), task_id.to_string())])
}

/// Filter string for label-scoped bot listings.
pub fn managed_filter() -> String {
    format!("{}=true", LABEL_MANAGED)
}
