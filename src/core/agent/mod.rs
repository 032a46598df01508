mod api_keys;
mod connection;
mod error_handler;
mod functionality;
mod mcp_health;
mod performance;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::broadcast;

use crate::core::orchestrator::types::Health;

pub use api_keys::ApiKeyHunter;
pub use connection::ConnectionMonitor;
pub use error_handler::ErrorHandler;
pub use functionality::FunctionalityTester;
pub use mcp_health::McpHealthChecker;
pub use performance::PerformanceMonitor;

/// Result of a single `Agent::run` call. `success == false` means the agent
/// completed but found a problem; a returned `Err` means the run itself failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

impl RunOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            error: None,
            details: serde_json::Value::Null,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            error: None,
            details: serde_json::Value::Null,
        }
    }

    /// Outcome reported for a run whose `run()` returned an error.
    pub fn errored(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
            details: serde_json::Value::Null,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriticalIssue {
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

impl CriticalIssue {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            details: serde_json::Value::Null,
        }
    }
}

/// Out-of-band notifications an agent may raise between runs.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentSignal {
    Critical(CriticalIssue),
    Status {
        message: String,
        health: Option<Health>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    Recovered,
    Unsupported,
}

/// A periodically-run monitor or automation task.
///
/// Only `name` and `run` are required. Agents that raise signals return a
/// receiver from `signals`; the orchestrator subscribes once on start.
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self) -> Result<RunOutcome>;

    fn signals(&self) -> Option<broadcast::Receiver<AgentSignal>> {
        None
    }

    async fn recover(&self, _issue: &CriticalIssue) -> Result<Recovery> {
        Ok(Recovery::Unsupported)
    }

    async fn cleanup(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub agent: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

/// Destination for run failures caught by the orchestrator.
pub trait ErrorSink: Send + Sync {
    fn log_error(&self, record: ErrorRecord);
}

/// Sender half shared by agents that raise signals.
#[derive(Clone)]
pub(crate) struct SignalBus {
    tx: broadcast::Sender<AgentSignal>,
}

impl SignalBus {
    pub(crate) fn new() -> Self {
        let (tx, _) = broadcast::channel(32);
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<AgentSignal> {
        self.tx.subscribe()
    }

    pub(crate) fn critical(&self, issue: CriticalIssue) {
        let _ = self.tx.send(AgentSignal::Critical(issue));
    }

    pub(crate) fn status(&self, message: impl Into<String>, health: Option<Health>) {
        let _ = self.tx.send(AgentSignal::Status {
            message: message.into(),
            health,
        });
    }
}

pub(crate) fn http_client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .user_agent(concat!("bdbt-agents/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

#[cfg(test)]
pub(crate) mod test_support {
    use axum::{Router, http::StatusCode, routing::get};
    use std::time::Duration;

    /// Serves `/ok`, `/down`, `/slow` and `/text` on an ephemeral port.
    pub(crate) async fn spawn_probe_server() -> String {
        let app = Router::new()
            .route("/ok", get(|| async { "BDBT wellness tips" }))
            .route("/down", get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "down") }))
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_millis(150)).await;
                    "eventually"
                }),
            )
            .route("/text", get(|| async { "plain response" }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    /// An address nothing is listening on.
    pub(crate) async fn closed_addr() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr.to_string()
    }
}
