use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;

use super::{Agent, RunOutcome, http_client};
use crate::config::{EndpointCheck, FunctionalityConfig};
use crate::core::orchestrator::schedule::FUNCTIONALITY_TESTER;

/// Exercises user-facing pages and API routes and checks their responses.
pub struct FunctionalityTester {
    config: FunctionalityConfig,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckResult {
    name: String,
    passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

impl FunctionalityTester {
    pub fn new(config: FunctionalityConfig) -> Self {
        let client = http_client(config.timeout_secs);
        Self { config, client }
    }

    async fn check(&self, check: &EndpointCheck) -> Result<CheckResult> {
        let url = reqwest::Url::parse(&check.url)
            .with_context(|| format!("check '{}' has an invalid url", check.name))?;

        let failure = |reason: String| CheckResult {
            name: check.name.clone(),
            passed: false,
            reason: Some(reason),
        };

        let resp = match self.client.get(url).send().await {
            Ok(resp) => resp,
            Err(e) => return Ok(failure(e.to_string())),
        };
        let status = resp.status().as_u16();
        if status != check.expect_status {
            return Ok(failure(format!(
                "expected status {}, got {}",
                check.expect_status, status
            )));
        }
        if let Some(needle) = &check.contains {
            let body = match resp.text().await {
                Ok(body) => body,
                Err(e) => return Ok(failure(format!("unreadable body: {}", e))),
            };
            if !body.contains(needle.as_str()) {
                return Ok(failure(format!("body does not contain '{}'", needle)));
            }
        }
        Ok(CheckResult {
            name: check.name.clone(),
            passed: true,
            reason: None,
        })
    }
}

#[async_trait]
impl Agent for FunctionalityTester {
    fn name(&self) -> &str {
        FUNCTIONALITY_TESTER
    }

    async fn run(&self) -> Result<RunOutcome> {
        if self.config.checks.is_empty() {
            return Ok(RunOutcome::ok("no functionality checks configured"));
        }

        let mut results = Vec::with_capacity(self.config.checks.len());
        for check in &self.config.checks {
            results.push(self.check(check).await?);
        }
        let failed = results.iter().filter(|r| !r.passed).count();
        let details = serde_json::json!({ "checks": results });

        if failed == 0 {
            Ok(RunOutcome::ok(format!("{} check(s) passed", results.len())).with_details(details))
        } else {
            Ok(RunOutcome::failed(format!(
                "{} of {} check(s) failed",
                failed,
                results.len()
            ))
            .with_details(details))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::agent::test_support::spawn_probe_server;

    fn check(name: &str, url: String, contains: Option<&str>) -> EndpointCheck {
        EndpointCheck {
            name: name.to_string(),
            url,
            expect_status: 200,
            contains: contains.map(str::to_string),
        }
    }

    fn tester(checks: Vec<EndpointCheck>) -> FunctionalityTester {
        FunctionalityTester::new(FunctionalityConfig {
            checks,
            timeout_secs: 2,
        })
    }

    #[tokio::test]
    async fn passing_checks_succeed() {
        let base = spawn_probe_server().await;
        let outcome = tester(vec![check("home", format!("{}/ok", base), Some("wellness"))])
            .run()
            .await
            .unwrap();
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn wrong_status_and_missing_text_fail() {
        let base = spawn_probe_server().await;
        let outcome = tester(vec![
            check("home", format!("{}/ok", base), None),
            check("api", format!("{}/down", base), None),
            check("tips", format!("{}/text", base), Some("wellness")),
        ])
        .run()
        .await
        .unwrap();
        assert!(!outcome.success);
        let checks = outcome.details["checks"].as_array().unwrap();
        assert_eq!(checks[0]["passed"], true);
        assert_eq!(checks[1]["passed"], false);
        assert!(checks[2]["reason"].as_str().unwrap().contains("wellness"));
    }

    #[tokio::test]
    async fn invalid_url_is_an_error() {
        let result = tester(vec![check("broken", "::::".into(), None)]).run().await;
        assert!(result.is_err());
    }
}
