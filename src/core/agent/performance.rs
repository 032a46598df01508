use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

use super::{Agent, AgentSignal, CriticalIssue, RunOutcome, SignalBus, http_client};
use crate::config::PerformanceConfig;
use crate::core::orchestrator::schedule::PERFORMANCE_MONITOR;
use crate::core::orchestrator::types::Health;

/// Samples response latency of the public site.
pub struct PerformanceMonitor {
    config: PerformanceConfig,
    client: reqwest::Client,
    bus: SignalBus,
}

impl PerformanceMonitor {
    pub fn new(config: PerformanceConfig) -> Self {
        let client = http_client(config.timeout_secs);
        Self {
            config,
            client,
            bus: SignalBus::new(),
        }
    }

    fn classify(&self, avg_ms: u64) -> Health {
        if avg_ms >= self.config.critical_ms {
            Health::Critical
        } else if avg_ms >= self.config.degraded_ms {
            Health::Degraded
        } else {
            Health::Healthy
        }
    }
}

#[async_trait]
impl Agent for PerformanceMonitor {
    fn name(&self) -> &str {
        PERFORMANCE_MONITOR
    }

    async fn run(&self) -> Result<RunOutcome> {
        let Some(target) = &self.config.url else {
            return Ok(RunOutcome::ok("no performance target configured"));
        };
        let url = reqwest::Url::parse(target)
            .with_context(|| format!("invalid performance target '{}'", target))?;

        let samples = self.config.samples.max(1);
        let mut timings = Vec::with_capacity(samples as usize);
        let mut failures = Vec::new();
        for _ in 0..samples {
            let started = Instant::now();
            let resp = self
                .client
                .get(url.clone())
                .send()
                .await
                .with_context(|| format!("request to {} failed", target))?;
            let status = resp.status();
            if !status.is_success() {
                failures.push(format!("HTTP {}", status.as_u16()));
                continue;
            }
            // Include body transfer in the measurement.
            if let Err(e) = resp.bytes().await {
                failures.push(format!("body read failed: {}", e));
                continue;
            }
            timings.push(started.elapsed());
        }

        if timings.is_empty() {
            bail!(
                "all {} samples from {} failed: {}",
                samples,
                target,
                failures.join(", ")
            );
        }

        let total: Duration = timings.iter().sum();
        let avg_ms = (total / timings.len() as u32).as_millis() as u64;
        let max_ms = timings.iter().max().map(|d| d.as_millis() as u64).unwrap_or(0);
        let mut health = self.classify(avg_ms);
        if !failures.is_empty() {
            health = health.max(Health::Degraded);
        }
        let details = serde_json::json!({
            "samples": samples,
            "failedSamples": failures.len(),
            "avgMs": avg_ms,
            "maxMs": max_ms,
        });

        match health {
            Health::Healthy => {
                Ok(RunOutcome::ok(format!("average response {}ms", avg_ms)).with_details(details))
            }
            Health::Degraded if !failures.is_empty() => Ok(RunOutcome::failed(format!(
                "{} of {} samples failed ({})",
                failures.len(),
                samples,
                failures.join(", ")
            ))
            .with_details(details)),
            Health::Degraded => Ok(RunOutcome::failed(format!(
                "average response {}ms exceeds {}ms",
                avg_ms, self.config.degraded_ms
            ))
            .with_details(details)),
            Health::Critical => {
                let mut issue = CriticalIssue::new(
                    "latency",
                    format!("average response {}ms exceeds {}ms", avg_ms, self.config.critical_ms),
                );
                issue.details = details.clone();
                self.bus.critical(issue);
                Ok(RunOutcome::failed(format!("average response {}ms", avg_ms)).with_details(details))
            }
        }
    }

    fn signals(&self) -> Option<broadcast::Receiver<AgentSignal>> {
        Some(self.bus.subscribe())
    }
}
