use std::sync::Arc;
use std::time::Duration;

use super::{Behavior, RecordingSink, ScriptedAgent, hourly, orchestrator_with};
use crate::core::orchestrator::types::overall_health;
use crate::core::orchestrator::{
    AgentStatus, Health, Orchestrator, OrchestratorError, OrchestratorEvent, RunState,
    StatusUpdate,
};

fn status_with(name: &str, health: Health) -> AgentStatus {
    let mut status = AgentStatus::new(name, chrono::Utc::now());
    status.health = health;
    status
}

#[test]
fn overall_health_of_empty_table_is_healthy() {
    assert_eq!(overall_health(Vec::<&AgentStatus>::new()), Health::Healthy);
}

#[test]
fn overall_health_uses_strict_priority() {
    let healthy = status_with("a", Health::Healthy);
    let degraded = status_with("b", Health::Degraded);
    let critical = status_with("c", Health::Critical);

    assert_eq!(overall_health([&healthy]), Health::Healthy);
    assert_eq!(overall_health([&degraded]), Health::Degraded);
    assert_eq!(overall_health([&critical]), Health::Critical);
    assert_eq!(overall_health([&healthy, &degraded]), Health::Degraded);
    assert_eq!(overall_health([&degraded, &healthy, &critical]), Health::Critical);
    assert_eq!(overall_health([&healthy, &healthy.clone()]), Health::Healthy);
}

#[test]
fn partial_update_keeps_other_fields() {
    let start = chrono::Utc::now();
    let mut status = AgentStatus::new("a", start);
    assert_eq!(status.status, RunState::Stopped);

    status.apply(StatusUpdate::completed(Health::Healthy), start);
    let later = start + chrono::Duration::seconds(5);
    status.apply(StatusUpdate::health(Health::Critical), later);

    assert_eq!(status.status, RunState::Running);
    assert_eq!(status.health, Health::Critical);
    assert_eq!(status.last_check, later);
}

#[tokio::test]
async fn zero_agents_report_healthy_and_empty() {
    let orchestrator = Orchestrator::new(
        Vec::new(),
        Arc::new(RecordingSink::default()),
        Duration::from_secs(30),
    );
    let snapshot = orchestrator.get_status();
    assert!(snapshot.agents.is_empty());
    assert_eq!(snapshot.overall_health, Health::Healthy);
    assert!(snapshot.uptime >= 0.0);

    let json = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(json["agents"], serde_json::json!([]));
    assert_eq!(json["overallHealth"], "healthy");
}

#[tokio::test]
async fn status_before_any_run_is_empty() {
    let agent = Arc::new(ScriptedAgent::new("connection", Behavior::Succeed));
    let orchestrator = orchestrator_with(
        vec![(agent, hourly())],
        Arc::new(RecordingSink::default()),
        Duration::from_secs(30),
    );
    assert!(orchestrator.get_status().agents.is_empty());
    assert!(orchestrator.has_agent("connection"));
}

#[tokio::test]
async fn one_succeeding_and_one_throwing_agent_is_critical() {
    let sink = Arc::new(RecordingSink::default());
    let a = Arc::new(ScriptedAgent::new("A", Behavior::Succeed));
    let b = Arc::new(ScriptedAgent::new("B", Behavior::Throw));
    let orchestrator = orchestrator_with(
        vec![(a, hourly()), (b, hourly())],
        sink.clone(),
        Duration::from_secs(30),
    );

    let ok = orchestrator.run_now("A").await.unwrap().unwrap();
    assert!(ok.success);
    let failed = orchestrator.run_now("B").await.unwrap().unwrap();
    assert!(!failed.success);
    assert!(failed.error.unwrap().contains("probe exploded"));

    let snapshot = orchestrator.get_status();
    assert_eq!(snapshot.agents.len(), 2);
    let (name_a, status_a) = &snapshot.agents[0];
    let (name_b, status_b) = &snapshot.agents[1];
    assert_eq!(name_a, "A");
    assert_eq!(status_a.status, RunState::Running);
    assert_eq!(status_a.health, Health::Healthy);
    assert_eq!(name_b, "B");
    assert_eq!(status_b.status, RunState::Error);
    assert_eq!(status_b.health, Health::Critical);
    assert_eq!(snapshot.overall_health, Health::Critical);

    let json = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(json["agents"][0][0], "A");
    assert_eq!(json["agents"][0][1]["status"], "running");
    assert_eq!(json["agents"][1][1]["health"], "critical");
    assert!(json["agents"][1][1]["lastCheck"].is_string());
    assert_eq!(json["overallHealth"], "critical");

    let records = sink.records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].agent, "B");
}

#[tokio::test]
async fn reported_problem_is_degraded_not_critical() {
    let agent = Arc::new(ScriptedAgent::new("perf", Behavior::ReportProblem));
    let sink = Arc::new(RecordingSink::default());
    let orchestrator = orchestrator_with(vec![(agent, hourly())], sink.clone(), Duration::from_secs(30));

    orchestrator.run_now("perf").await.unwrap();
    let snapshot = orchestrator.get_status();
    assert_eq!(snapshot.agents[0].1.status, RunState::Running);
    assert_eq!(snapshot.agents[0].1.health, Health::Degraded);
    assert_eq!(snapshot.overall_health, Health::Degraded);
    assert!(sink.records.lock().unwrap().is_empty());
}

#[tokio::test]
async fn repeated_runs_keep_one_entry_per_agent() {
    let agent = Arc::new(ScriptedAgent::new("A", Behavior::Succeed));
    let orchestrator = orchestrator_with(
        vec![(agent.clone(), hourly())],
        Arc::new(RecordingSink::default()),
        Duration::from_secs(30),
    );
    for _ in 0..3 {
        orchestrator.run_now("A").await.unwrap();
    }
    assert_eq!(agent.runs(), 3);
    assert_eq!(orchestrator.get_status().agents.len(), 1);
}

#[tokio::test]
async fn every_run_emits_agent_complete() {
    let a = Arc::new(ScriptedAgent::new("A", Behavior::Succeed));
    let b = Arc::new(ScriptedAgent::new("B", Behavior::Throw));
    let orchestrator = orchestrator_with(
        vec![(a, hourly()), (b, hourly())],
        Arc::new(RecordingSink::default()),
        Duration::from_secs(30),
    );
    let mut events = orchestrator.subscribe();

    orchestrator.run_now("A").await.unwrap();
    orchestrator.run_now("B").await.unwrap();

    for expected in ["A", "B"] {
        match events.recv().await.unwrap() {
            OrchestratorEvent::AgentComplete(done) => assert_eq!(done.agent, expected),
            other => panic!("unexpected event {}", other.name()),
        }
    }
}

#[tokio::test]
async fn run_now_rejects_unknown_agents() {
    let orchestrator = Orchestrator::new(
        Vec::new(),
        Arc::new(RecordingSink::default()),
        Duration::from_secs(30),
    );
    let err = orchestrator.run_now("ghost").await.unwrap_err();
    assert!(matches!(err, OrchestratorError::UnknownAgent(name) if name == "ghost"));
}

#[tokio::test]
async fn overlapping_runs_of_one_agent_are_skipped() {
    let agent = Arc::new(ScriptedAgent::new(
        "slow",
        Behavior::Slow(Duration::from_millis(200)),
    ));
    let orchestrator = orchestrator_with(
        vec![(agent.clone(), hourly())],
        Arc::new(RecordingSink::default()),
        Duration::from_secs(30),
    );

    let (first, second) = tokio::join!(orchestrator.run_now("slow"), orchestrator.run_now("slow"));
    assert!(first.unwrap().is_some());
    assert!(second.unwrap().is_none());
    assert_eq!(agent.runs(), 1);

    // The flag is released once the run finishes.
    assert!(orchestrator.run_now("slow").await.unwrap().is_some());
}

#[tokio::test]
async fn broadcast_health_publishes_current_snapshot() {
    let agent = Arc::new(ScriptedAgent::new("A", Behavior::ReportProblem));
    let orchestrator = orchestrator_with(
        vec![(agent, hourly())],
        Arc::new(RecordingSink::default()),
        Duration::from_secs(30),
    );
    orchestrator.run_now("A").await.unwrap();

    let mut events = orchestrator.subscribe();
    orchestrator.broadcast_health();
    match events.recv().await.unwrap() {
        OrchestratorEvent::HealthUpdate(update) => {
            assert_eq!(update.overall_health, Health::Degraded);
            assert_eq!(update.agents.len(), 1);
        }
        other => panic!("unexpected event {}", other.name()),
    }
}
