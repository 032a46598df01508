use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::broadcast;

use super::{Agent, AgentSignal, CriticalIssue, RunOutcome, SignalBus};
use crate::config::McpConfig;
use crate::core::orchestrator::schedule::MCP_HEALTH_CHECKER;

/// Verifies the configured MCP servers accept TCP connections.
pub struct McpHealthChecker {
    config: McpConfig,
    bus: SignalBus,
}

impl McpHealthChecker {
    pub fn new(config: McpConfig) -> Self {
        Self {
            config,
            bus: SignalBus::new(),
        }
    }

    async fn probe(&self, addr: &str) -> Result<(), String> {
        let timeout = Duration::from_secs(self.config.timeout_secs.max(1));
        match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(format!("{}: {}", addr, e)),
            Err(_) => Err(format!("{}: timed out", addr)),
        }
    }
}

#[async_trait]
impl Agent for McpHealthChecker {
    fn name(&self) -> &str {
        MCP_HEALTH_CHECKER
    }

    async fn run(&self) -> Result<RunOutcome> {
        if self.config.servers.is_empty() {
            return Ok(RunOutcome::ok("no MCP servers configured"));
        }

        let mut down = Vec::new();
        for server in &self.config.servers {
            if let Err(reason) = self.probe(server).await {
                down.push(reason);
            }
        }

        let total = self.config.servers.len();
        let details = serde_json::json!({ "servers": total, "down": down });
        if down.is_empty() {
            return Ok(RunOutcome::ok(format!("{} MCP server(s) up", total)).with_details(details));
        }
        if down.len() == total {
            self.bus
                .critical(CriticalIssue::new("mcp-unreachable", "all MCP servers are down"));
        }
        Ok(
            RunOutcome::failed(format!("{} of {} MCP server(s) down", down.len(), total))
                .with_details(details),
        )
    }

    fn signals(&self) -> Option<broadcast::Receiver<AgentSignal>> {
        Some(self.bus.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::agent::test_support::closed_addr;

    #[tokio::test]
    async fn listening_server_is_up() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let checker = McpHealthChecker::new(McpConfig {
            servers: vec![addr],
            timeout_secs: 1,
        });
        assert!(checker.run().await.unwrap().success);
    }

    #[tokio::test]
    async fn all_servers_down_raises_critical() {
        let checker = McpHealthChecker::new(McpConfig {
            servers: vec![closed_addr().await],
            timeout_secs: 1,
        });
        let mut signals = checker.signals().unwrap();
        let outcome = checker.run().await.unwrap();
        assert!(!outcome.success);
        assert!(matches!(
            signals.try_recv().unwrap(),
            AgentSignal::Critical(issue) if issue.kind == "mcp-unreachable"
        ));
    }
}
