use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

pub const CONNECTION_MONITOR: &str = "connectionMonitor";
pub const MCP_HEALTH_CHECKER: &str = "mcpHealthChecker";
pub const FUNCTIONALITY_TESTER: &str = "functionalityTester";
pub const API_KEY_HUNTER: &str = "apiKeyHunter";
pub const PERFORMANCE_MONITOR: &str = "performanceMonitor";
pub const ERROR_HANDLER: &str = "errorHandler";

/// How often a scheduled job recurs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Cadence {
    /// Six-field cron expression (seconds first).
    Cron(String),
    Every(Duration),
}

impl Cadence {
    pub fn cron(expr: impl Into<String>) -> Self {
        Cadence::Cron(expr.into())
    }

    pub fn describe(&self) -> String {
        match self {
            Cadence::Cron(expr) => format!("cron {}", expr),
            Cadence::Every(interval) => format!("every {}s", interval.as_secs_f64()),
        }
    }

    pub(crate) fn job<F>(&self, run: F) -> Result<Job, JobSchedulerError>
    where
        F: FnMut(uuid::Uuid, JobScheduler) -> Pin<Box<dyn Future<Output = ()> + Send>>
            + Send
            + Sync
            + 'static,
    {
        match self {
            Cadence::Cron(expr) => Job::new_async(expr.as_str(), run),
            Cadence::Every(interval) => Job::new_repeated_async(*interval, run),
        }
    }
}

/// Cadence as written in the config file: a cron string or `{ every_secs = N }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScheduleEntry {
    Cron(String),
    Interval { every_secs: u64 },
}

impl From<&ScheduleEntry> for Cadence {
    fn from(entry: &ScheduleEntry) -> Self {
        match entry {
            ScheduleEntry::Cron(expr) => Cadence::Cron(expr.trim().to_string()),
            ScheduleEntry::Interval { every_secs } => {
                Cadence::Every(Duration::from_secs((*every_secs).max(1)))
            }
        }
    }
}

pub fn default_cadences() -> BTreeMap<&'static str, Cadence> {
    BTreeMap::from([
        (CONNECTION_MONITOR, Cadence::cron("0 0/5 * * * *")),
        (MCP_HEALTH_CHECKER, Cadence::cron("0 0/10 * * * *")),
        (FUNCTIONALITY_TESTER, Cadence::cron("0 0 * * * *")),
        (API_KEY_HUNTER, Cadence::cron("0 0 9 * * *")),
        (PERFORMANCE_MONITOR, Cadence::cron("0 0/15 * * * *")),
        (ERROR_HANDLER, Cadence::cron("0 0/30 * * * *")),
    ])
}

/// Default cadences with config overrides applied. Unknown agent names are
/// reported back so the caller can warn about them.
pub fn resolve_cadences(
    overrides: &BTreeMap<String, ScheduleEntry>,
) -> (BTreeMap<String, Cadence>, Vec<String>) {
    let mut cadences: BTreeMap<String, Cadence> = default_cadences()
        .into_iter()
        .map(|(name, cadence)| (name.to_string(), cadence))
        .collect();
    let mut unknown = Vec::new();
    for (name, entry) in overrides {
        match cadences.get_mut(name) {
            Some(slot) => *slot = Cadence::from(entry),
            None => unknown.push(name.clone()),
        }
    }
    (cadences, unknown)
}
