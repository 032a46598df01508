use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::{error, info};

use super::{Agent, ErrorRecord, ErrorSink, RunOutcome};
use crate::config::ErrorHandlerConfig;
use crate::core::orchestrator::schedule::ERROR_HANDLER;

/// Collects run failures from the orchestrator and reports the error rate.
pub struct ErrorHandler {
    config: ErrorHandlerConfig,
    history: Mutex<VecDeque<ErrorRecord>>,
}

impl ErrorHandler {
    pub fn new(config: ErrorHandlerConfig) -> Self {
        Self {
            config,
            history: Mutex::new(VecDeque::new()),
        }
    }

    /// Newest last.
    pub fn recent_errors(&self) -> Vec<ErrorRecord> {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    fn errors_in_window(&self) -> usize {
        let window = chrono::Duration::seconds(self.config.window_secs as i64);
        let cutoff = Utc::now() - window;
        self.recent_errors()
            .iter()
            .filter(|r| r.timestamp >= cutoff)
            .count()
    }
}

impl ErrorSink for ErrorHandler {
    fn log_error(&self, record: ErrorRecord) {
        error!(
            "[{}] {} (at {})",
            record.agent,
            record.error,
            record.timestamp.to_rfc3339()
        );
        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history.push_back(record);
        while history.len() > self.config.history.max(1) {
            history.pop_front();
        }
    }
}

#[async_trait]
impl Agent for ErrorHandler {
    fn name(&self) -> &str {
        ERROR_HANDLER
    }

    async fn run(&self) -> Result<RunOutcome> {
        let recent = self.errors_in_window();
        let details = serde_json::json!({
            "recentErrors": recent,
            "windowSecs": self.config.window_secs,
        });
        if recent > self.config.max_errors {
            Ok(RunOutcome::failed(format!(
                "{} errors in the last {}s",
                recent, self.config.window_secs
            ))
            .with_details(details))
        } else {
            Ok(RunOutcome::ok(format!("{} recent error(s)", recent)).with_details(details))
        }
    }

    async fn cleanup(&self) -> Result<()> {
        let count = self.history.lock().unwrap_or_else(|e| e.into_inner()).len();
        info!("Error handler recorded {} error(s) this session", count);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(agent: &str, age_secs: i64) -> ErrorRecord {
        ErrorRecord {
            agent: agent.to_string(),
            error: "boom".to_string(),
            timestamp: Utc::now() - chrono::Duration::seconds(age_secs),
        }
    }

    fn handler(max_errors: usize, history: usize) -> ErrorHandler {
        ErrorHandler::new(ErrorHandlerConfig {
            window_secs: 60,
            max_errors,
            history,
        })
    }

    #[test]
    fn history_is_bounded() {
        let handler = handler(10, 3);
        for i in 0..5 {
            handler.log_error(record(&format!("agent-{}", i), 0));
        }
        let recent = handler.recent_errors();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].agent, "agent-2");
        assert_eq!(recent[2].agent, "agent-4");
    }

    #[tokio::test]
    async fn run_degrades_above_threshold() {
        let handler = handler(1, 10);
        assert!(handler.run().await.unwrap().success);

        handler.log_error(record("a", 0));
        handler.log_error(record("b", 0));
        let outcome = handler.run().await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.details["recentErrors"], 2);
    }

    #[tokio::test]
    async fn old_errors_fall_out_of_the_window() {
        let handler = handler(0, 10);
        handler.log_error(record("stale", 600));
        assert!(handler.run().await.unwrap().success);
    }
}
