mod status_table;

use anyhow::{Result, bail};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

use crate::core::agent::{
    Agent, AgentSignal, CriticalIssue, ErrorRecord, ErrorSink, Recovery, RunOutcome, SignalBus,
};
use crate::core::orchestrator::{Cadence, Orchestrator};

#[derive(Clone, Copy)]
pub(super) enum Behavior {
    Succeed,
    ReportProblem,
    Throw,
    Slow(Duration),
    /// Raises a critical issue, waits, then reports a problem.
    RaiseThenReport(Duration),
}

pub(super) struct ScriptedAgent {
    name: String,
    behavior: Behavior,
    pub(super) runs: AtomicUsize,
    pub(super) cleaned_up: AtomicBool,
    pub(super) recover_calls: AtomicUsize,
    recover_fails: bool,
    bus: Option<SignalBus>,
}

impl ScriptedAgent {
    pub(super) fn new(name: &str, behavior: Behavior) -> Self {
        Self {
            name: name.to_string(),
            behavior,
            runs: AtomicUsize::new(0),
            cleaned_up: AtomicBool::new(false),
            recover_calls: AtomicUsize::new(0),
            recover_fails: false,
            bus: None,
        }
    }

    pub(super) fn with_signals(mut self, recover_fails: bool) -> Self {
        self.bus = Some(SignalBus::new());
        self.recover_fails = recover_fails;
        self
    }

    pub(super) fn raise(&self, issue: CriticalIssue) {
        if let Some(bus) = &self.bus {
            bus.critical(issue);
        }
    }

    pub(super) fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> Result<RunOutcome> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            Behavior::Succeed => Ok(RunOutcome::ok("all good")),
            Behavior::ReportProblem => Ok(RunOutcome::failed("found a problem")),
            Behavior::Throw => bail!("probe exploded"),
            Behavior::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(RunOutcome::ok("slow but fine"))
            }
            Behavior::RaiseThenReport(delay) => {
                self.raise(CriticalIssue::new("connection-lost", "every endpoint unreachable"));
                tokio::time::sleep(delay).await;
                Ok(RunOutcome::failed("0 of 2 endpoints reachable"))
            }
        }
    }

    fn signals(&self) -> Option<broadcast::Receiver<AgentSignal>> {
        self.bus.as_ref().map(SignalBus::subscribe)
    }

    async fn recover(&self, _issue: &CriticalIssue) -> Result<Recovery> {
        if self.bus.is_none() {
            return Ok(Recovery::Unsupported);
        }
        self.recover_calls.fetch_add(1, Ordering::SeqCst);
        if self.recover_fails {
            bail!("recovery routine crashed");
        }
        Ok(Recovery::Recovered)
    }

    async fn cleanup(&self) -> Result<()> {
        self.cleaned_up.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Agent relying on every default hook.
pub(super) struct BareAgent;

#[async_trait]
impl Agent for BareAgent {
    fn name(&self) -> &str {
        "bare"
    }

    async fn run(&self) -> Result<RunOutcome> {
        Ok(RunOutcome::ok("bare run"))
    }
}

#[derive(Default)]
pub(super) struct RecordingSink {
    pub(super) records: Mutex<Vec<ErrorRecord>>,
}

impl ErrorSink for RecordingSink {
    fn log_error(&self, record: ErrorRecord) {
        self.records.lock().unwrap().push(record);
    }
}

pub(super) fn orchestrator_with(
    agents: Vec<(Arc<ScriptedAgent>, Cadence)>,
    sink: Arc<RecordingSink>,
    health_interval: Duration,
) -> Orchestrator {
    let agents = agents
        .into_iter()
        .map(|(agent, cadence)| (agent as Arc<dyn Agent>, cadence))
        .collect();
    Orchestrator::new(agents, sink, health_interval)
}

pub(super) fn hourly() -> Cadence {
    Cadence::cron("0 0 * * * *")
}
