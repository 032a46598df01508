use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::agent::RunOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    #[default]
    Stopped,
    Error,
}

impl RunState {
    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Running => "running",
            RunState::Stopped => "stopped",
            RunState::Error => "error",
        }
    }
}

/// Severity ordering matters: `Healthy < Degraded < Critical`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    #[default]
    Healthy,
    Degraded,
    Critical,
}

impl Health {
    pub fn as_str(self) -> &'static str {
        match self {
            Health::Healthy => "healthy",
            Health::Degraded => "degraded",
            Health::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatus {
    pub name: String,
    pub status: RunState,
    pub health: Health,
    pub last_check: DateTime<Utc>,
}

/// Partial update merged into an existing `AgentStatus`; `None` fields are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: Option<RunState>,
    pub health: Option<Health>,
}

impl StatusUpdate {
    pub fn completed(health: Health) -> Self {
        Self {
            status: Some(RunState::Running),
            health: Some(health),
        }
    }

    pub fn failed() -> Self {
        Self {
            status: Some(RunState::Error),
            health: Some(Health::Critical),
        }
    }

    pub fn health(health: Health) -> Self {
        Self {
            status: None,
            health: Some(health),
        }
    }
}

impl AgentStatus {
    pub fn new(name: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            status: RunState::default(),
            health: Health::default(),
            last_check: at,
        }
    }

    pub fn apply(&mut self, update: StatusUpdate, at: DateTime<Utc>) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(health) = update.health {
            self.health = health;
        }
        self.last_check = at;
    }
}

/// Worst health across all agents; an empty table is healthy.
pub fn overall_health<'a, I>(statuses: I) -> Health
where
    I: IntoIterator<Item = &'a AgentStatus>,
{
    statuses
        .into_iter()
        .map(|s| s.health)
        .max()
        .unwrap_or(Health::Healthy)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub agents: Vec<(String, AgentStatus)>,
    pub overall_health: Health,
    /// Seconds since the orchestrator was created.
    pub uptime: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthUpdate {
    pub timestamp: DateTime<Utc>,
    pub agents: Vec<(String, AgentStatus)>,
    pub overall_health: Health,
    pub uptime: f64,
}

impl From<StatusSnapshot> for HealthUpdate {
    fn from(snapshot: StatusSnapshot) -> Self {
        Self {
            timestamp: Utc::now(),
            agents: snapshot.agents,
            overall_health: snapshot.overall_health,
            uptime: snapshot.uptime,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCompletion {
    pub agent: String,
    pub result: RunOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorEvent {
    AgentComplete(AgentCompletion),
    HealthUpdate(HealthUpdate),
}

impl OrchestratorEvent {
    pub fn name(&self) -> &'static str {
        match self {
            OrchestratorEvent::AgentComplete(_) => "agentComplete",
            OrchestratorEvent::HealthUpdate(_) => "healthUpdate",
        }
    }
}
