use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::{Agent, AgentSignal, CriticalIssue, Recovery, RunOutcome, SignalBus, http_client};
use crate::config::ConnectionConfig;
use crate::core::orchestrator::schedule::CONNECTION_MONITOR;

/// Checks that the backing services (database API, auth, storage) answer.
pub struct ConnectionMonitor {
    config: ConnectionConfig,
    client: RwLock<reqwest::Client>,
    bus: SignalBus,
}

impl ConnectionMonitor {
    pub fn new(config: ConnectionConfig) -> Self {
        let client = http_client(config.timeout_secs);
        Self {
            config,
            client: RwLock::new(client),
            bus: SignalBus::new(),
        }
    }

    fn client(&self) -> reqwest::Client {
        self.client
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl Agent for ConnectionMonitor {
    fn name(&self) -> &str {
        CONNECTION_MONITOR
    }

    async fn run(&self) -> Result<RunOutcome> {
        if self.config.endpoints.is_empty() {
            return Ok(RunOutcome::ok("no endpoints configured"));
        }

        let client = self.client();
        let mut unreachable = Vec::new();
        for endpoint in &self.config.endpoints {
            let url = reqwest::Url::parse(endpoint)
                .with_context(|| format!("invalid endpoint url '{}'", endpoint))?;
            match client.get(url).send().await {
                Ok(resp) if resp.status().is_success() || resp.status().is_redirection() => {
                    debug!("{} reachable ({})", endpoint, resp.status());
                }
                Ok(resp) => unreachable.push(format!("{} returned {}", endpoint, resp.status())),
                Err(e) => unreachable.push(format!("{}: {}", endpoint, e)),
            }
        }

        let total = self.config.endpoints.len();
        let details = serde_json::json!({
            "checked": total,
            "unreachable": unreachable,
        });

        if unreachable.is_empty() {
            return Ok(RunOutcome::ok(format!("{} endpoint(s) reachable", total)).with_details(details));
        }
        if unreachable.len() == total {
            let mut issue = CriticalIssue::new("connection-lost", "no configured endpoint is reachable");
            issue.details = details.clone();
            self.bus.critical(issue);
        }
        Ok(RunOutcome::failed(format!(
            "{} of {} endpoint(s) unreachable",
            unreachable.len(),
            total
        ))
        .with_details(details))
    }

    fn signals(&self) -> Option<broadcast::Receiver<AgentSignal>> {
        Some(self.bus.subscribe())
    }

    /// Drops pooled connections by replacing the HTTP client.
    async fn recover(&self, issue: &CriticalIssue) -> Result<Recovery> {
        let fresh = http_client(self.config.timeout_secs);
        *self.client.write().unwrap_or_else(|e| e.into_inner()) = fresh;
        info!("Connection pool reset after '{}'", issue.kind);
        self.bus.status("connection pool reset", None);
        Ok(Recovery::Recovered)
    }
}
