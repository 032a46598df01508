pub mod schedule;
pub mod types;

use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex, broadcast};
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::DashboardConfig;
use crate::core::agent::{
    Agent, AgentSignal, ApiKeyHunter, ConnectionMonitor, CriticalIssue, ErrorHandler, ErrorRecord,
    ErrorSink, FunctionalityTester, McpHealthChecker, PerformanceMonitor, Recovery, RunOutcome,
};

pub use schedule::Cadence;
pub use types::{
    AgentCompletion, AgentStatus, Health, HealthUpdate, OrchestratorEvent, RunState,
    StatusSnapshot, StatusUpdate,
};

const HEALTH_JOB: &str = "__healthBroadcast";

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("orchestrator already started")]
    AlreadyStarted,
    #[error("unknown agent: {0}")]
    UnknownAgent(String),
    #[error("scheduler error: {0}")]
    Scheduler(#[from] JobSchedulerError),
}

struct RegisteredAgent {
    agent: Arc<dyn Agent>,
    cadence: Cadence,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag even if `run()` panics.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Default)]
struct StatusTable {
    agents: BTreeMap<String, AgentStatus>,
    /// Agents that raised a critical issue since their current run began.
    /// Checked under the same lock as the completion write so a run never
    /// lowers a critical health raised while it was in flight.
    raised_critical: HashSet<String>,
}

impl StatusTable {
    fn apply(&mut self, name: &str, update: StatusUpdate) {
        let now = Utc::now();
        self.agents
            .entry(name.to_string())
            .or_insert_with(|| AgentStatus::new(name, now))
            .apply(update, now);
    }
}

/// State shared between the orchestrator handle and its scheduled jobs.
struct Shared {
    agents: BTreeMap<String, RegisteredAgent>,
    status: RwLock<StatusTable>,
    events: broadcast::Sender<OrchestratorEvent>,
    error_sink: Arc<dyn ErrorSink>,
    started_at: Instant,
}

struct ActiveSchedule {
    scheduler: JobScheduler,
    jobs: HashMap<String, uuid::Uuid>,
    signals: CancellationToken,
}

pub struct Orchestrator {
    shared: Arc<Shared>,
    health_interval: Duration,
    active: Mutex<Option<ActiveSchedule>>,
}

impl Orchestrator {
    pub fn new(
        agents: Vec<(Arc<dyn Agent>, Cadence)>,
        error_sink: Arc<dyn ErrorSink>,
        health_interval: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        let agents = agents
            .into_iter()
            .map(|(agent, cadence)| {
                (
                    agent.name().to_string(),
                    RegisteredAgent {
                        agent,
                        cadence,
                        in_flight: AtomicBool::new(false),
                    },
                )
            })
            .collect();
        Self {
            shared: Arc::new(Shared {
                agents,
                status: RwLock::new(StatusTable::default()),
                events,
                error_sink,
                started_at: Instant::now(),
            }),
            health_interval,
            active: Mutex::new(None),
        }
    }

    /// Builds the six built-in agents with the cadences from `config`.
    pub fn from_config(config: &DashboardConfig) -> Self {
        let (cadences, unknown) = schedule::resolve_cadences(&config.schedules);
        for name in unknown {
            warn!("Ignoring schedule for unknown agent '{}'", name);
        }

        let error_handler = Arc::new(ErrorHandler::new(config.agents.error_handler.clone()));
        let agents: Vec<Arc<dyn Agent>> = vec![
            Arc::new(ConnectionMonitor::new(config.agents.connection.clone())),
            Arc::new(McpHealthChecker::new(config.agents.mcp.clone())),
            Arc::new(FunctionalityTester::new(config.agents.functionality.clone())),
            Arc::new(ApiKeyHunter::new(config.agents.api_keys.clone())),
            Arc::new(PerformanceMonitor::new(config.agents.performance.clone())),
            error_handler.clone(),
        ];

        let registrations = agents
            .into_iter()
            .filter_map(|agent| {
                let cadence = cadences.get(agent.name())?.clone();
                Some((agent, cadence))
            })
            .collect();

        Self::new(
            registrations,
            error_handler,
            Duration::from_secs(config.server.health_interval_secs.max(1)),
        )
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.shared.events.subscribe()
    }

    pub fn has_agent(&self, name: &str) -> bool {
        self.shared.agents.contains_key(name)
    }

    pub fn cadences(&self) -> Vec<(String, Cadence)> {
        self.shared
            .agents
            .iter()
            .map(|(name, entry)| (name.clone(), entry.cadence.clone()))
            .collect()
    }

    pub async fn is_running(&self) -> bool {
        self.active.lock().await.is_some()
    }

    pub fn get_status(&self) -> StatusSnapshot {
        self.shared.snapshot()
    }

    pub fn health_update(&self) -> HealthUpdate {
        HealthUpdate::from(self.shared.snapshot())
    }

    /// Publishes a `healthUpdate` immediately, independent of the broadcast tick.
    pub fn broadcast_health(&self) {
        self.shared.broadcast_health();
    }

    /// Schedules one job per agent plus the periodic health broadcast.
    pub async fn start(&self) -> Result<(), OrchestratorError> {
        let mut active = self.active.lock().await;
        if active.is_some() {
            return Err(OrchestratorError::AlreadyStarted);
        }

        let scheduler = JobScheduler::new().await?;
        let mut jobs = HashMap::new();

        for (name, entry) in &self.shared.agents {
            let shared = self.shared.clone();
            let agent_name = name.clone();
            let job = entry.cadence.job(move |_uuid, _l| {
                let shared = shared.clone();
                let agent_name = agent_name.clone();
                Box::pin(async move {
                    shared.run_agent(&agent_name).await;
                })
            });

            // A bad cadence only costs that one agent its schedule.
            let job = match job {
                Ok(job) => job,
                Err(e) => {
                    error!("Failed to create job for agent [{}]: {}", name, e);
                    continue;
                }
            };
            match scheduler.add(job).await {
                Ok(id) => {
                    debug!("Scheduled agent [{}] ({})", name, entry.cadence.describe());
                    jobs.insert(name.clone(), id);
                }
                Err(e) => error!("Failed to schedule agent [{}]: {}", name, e),
            }
        }

        let shared = self.shared.clone();
        let health_job = Job::new_repeated_async(self.health_interval, move |_uuid, _l| {
            let shared = shared.clone();
            Box::pin(async move {
                shared.broadcast_health();
            })
        })?;
        jobs.insert(HEALTH_JOB.to_string(), scheduler.add(health_job).await?);

        let signals = CancellationToken::new();
        for (name, entry) in &self.shared.agents {
            if let Some(rx) = entry.agent.signals() {
                tokio::spawn(listen_for_signals(
                    self.shared.clone(),
                    name.clone(),
                    rx,
                    signals.clone(),
                ));
            }
        }

        scheduler.start().await?;
        info!(
            "Orchestrator started: {} agent job(s), health broadcast every {}s",
            jobs.len() - 1,
            self.health_interval.as_secs_f64()
        );

        *active = Some(ActiveSchedule {
            scheduler,
            jobs,
            signals,
        });
        Ok(())
    }

    /// Cancels every scheduled job and runs agent cleanup hooks. In-flight
    /// runs are left to finish. Never fails; problems are logged.
    pub async fn stop(&self) {
        let active = self.active.lock().await.take();
        if let Some(mut active) = active {
            for (name, id) in active.jobs.drain() {
                if let Err(e) = active.scheduler.remove(&id).await {
                    warn!("Failed to remove job for [{}]: {}", name, e);
                }
            }
            if let Err(e) = active.scheduler.shutdown().await {
                warn!("Scheduler shutdown error: {}", e);
            }
            active.signals.cancel();
        }

        for (name, entry) in &self.shared.agents {
            if let Err(e) = entry.agent.cleanup().await {
                warn!("Cleanup failed for agent [{}]: {}", name, e);
            }
        }
        info!("Orchestrator stopped");
    }

    /// Runs one agent right away, outside its schedule. Returns `None` when a
    /// run of the same agent is already in flight.
    pub async fn run_now(&self, name: &str) -> Result<Option<RunOutcome>, OrchestratorError> {
        if !self.has_agent(name) {
            return Err(OrchestratorError::UnknownAgent(name.to_string()));
        }
        Ok(self.shared.run_agent(name).await)
    }

    pub async fn handle_critical_issue(&self, name: &str, issue: CriticalIssue) {
        self.shared.handle_critical(name, issue).await;
    }
}

impl Shared {
    fn snapshot(&self) -> StatusSnapshot {
        let table = self.status.read().unwrap_or_else(|e| e.into_inner());
        StatusSnapshot {
            agents: table
                .agents
                .iter()
                .map(|(name, status)| (name.clone(), status.clone()))
                .collect(),
            overall_health: types::overall_health(table.agents.values()),
            uptime: self.started_at.elapsed().as_secs_f64(),
        }
    }

    fn table(&self) -> std::sync::RwLockWriteGuard<'_, StatusTable> {
        self.status.write().unwrap_or_else(|e| e.into_inner())
    }

    fn update_status(&self, name: &str, update: StatusUpdate) {
        self.table().apply(name, update);
    }

    /// Writes the result of a finished run. A critical issue raised during
    /// the run keeps the health at critical whichever side got the lock first.
    fn complete_run(&self, name: &str, mut update: StatusUpdate) -> Option<Health> {
        let mut table = self.table();
        if table.raised_critical.remove(name) {
            update.health = Some(Health::Critical);
        }
        table.apply(name, update);
        update.health
    }

    fn mark_critical(&self, name: &str) {
        let mut table = self.table();
        table.raised_critical.insert(name.to_string());
        table.apply(name, StatusUpdate::health(Health::Critical));
    }

    fn emit(&self, event: OrchestratorEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn broadcast_health(&self) {
        let update = HealthUpdate::from(self.snapshot());
        debug!("Health broadcast: {}", update.overall_health.as_str());
        self.emit(OrchestratorEvent::HealthUpdate(update));
    }

    async fn run_agent(&self, name: &str) -> Option<RunOutcome> {
        let entry = self.agents.get(name)?;

        if entry.in_flight.swap(true, Ordering::AcqRel) {
            warn!("Agent [{}] is still running; skipping this firing", name);
            return None;
        }
        self.table().raised_critical.remove(name);
        let result = {
            let _guard = InFlightGuard(&entry.in_flight);
            entry.agent.run().await
        };

        let outcome = match result {
            Ok(outcome) => {
                let health = if outcome.success {
                    Health::Healthy
                } else {
                    Health::Degraded
                };
                let applied = self
                    .complete_run(name, StatusUpdate::completed(health))
                    .unwrap_or(health);
                info!("Agent [{}] completed ({})", name, applied.as_str());
                outcome
            }
            Err(e) => {
                let message = format!("{:#}", e);
                error!("Agent [{}] failed: {}", name, message);
                self.complete_run(name, StatusUpdate::failed());
                self.error_sink.log_error(ErrorRecord {
                    agent: name.to_string(),
                    error: message.clone(),
                    timestamp: Utc::now(),
                });
                RunOutcome::errored(message)
            }
        };

        self.emit(OrchestratorEvent::AgentComplete(AgentCompletion {
            agent: name.to_string(),
            result: outcome.clone(),
        }));
        Some(outcome)
    }

    async fn handle_critical(&self, name: &str, issue: CriticalIssue) {
        error!(
            "Critical issue from [{}]: {} ({})",
            name, issue.message, issue.kind
        );
        self.mark_critical(name);

        if let Some(entry) = self.agents.get(name) {
            match entry.agent.recover(&issue).await {
                Ok(Recovery::Recovered) => info!("Agent [{}] recovered from '{}'", name, issue.kind),
                Ok(Recovery::Unsupported) => debug!("Agent [{}] has no recovery routine", name),
                Err(e) => error!("Recovery failed for [{}]: {:#}", name, e),
            }
        }

        warn!(
            "ADMIN NOTIFICATION: agent [{}] reported a critical issue: {}",
            name, issue.message
        );
    }
}

async fn listen_for_signals(
    shared: Arc<Shared>,
    name: String,
    mut rx: broadcast::Receiver<AgentSignal>,
    cancel: CancellationToken,
) {
    loop {
        let signal = tokio::select! {
            _ = cancel.cancelled() => break,
            signal = rx.recv() => signal,
        };
        match signal {
            Ok(AgentSignal::Critical(issue)) => shared.handle_critical(&name, issue).await,
            Ok(AgentSignal::Status { message, health }) => {
                info!("[{}] {}", name, message);
                if let Some(health) = health {
                    shared.update_status(&name, StatusUpdate::health(health));
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("[{}] dropped {} signal(s)", name, skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests;
