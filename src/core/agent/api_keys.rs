use anyhow::Result;
use async_trait::async_trait;

use super::{Agent, RunOutcome};
use crate::config::ApiKeyConfig;
use crate::core::orchestrator::schedule::API_KEY_HUNTER;

type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Values that are present but obviously not real credentials.
const PLACEHOLDER_MARKERS: &[&str] = &["your-", "your_", "changeme", "xxx", "<", "todo"];

/// Looks for missing or placeholder API keys in the environment.
/// Only key names are ever reported, never values.
pub struct ApiKeyHunter {
    config: ApiKeyConfig,
    lookup: EnvLookup,
}

#[derive(Debug, PartialEq, Eq)]
enum KeyState {
    Present,
    Missing,
    Placeholder,
}

impl ApiKeyHunter {
    pub fn new(config: ApiKeyConfig) -> Self {
        Self::with_lookup(config, |key| std::env::var(key).ok())
    }

    pub fn with_lookup<F>(config: ApiKeyConfig, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            config,
            lookup: Box::new(lookup),
        }
    }

    fn inspect(&self, key: &str) -> KeyState {
        match (self.lookup)(key) {
            None => KeyState::Missing,
            Some(value) if value.trim().is_empty() => KeyState::Missing,
            Some(value) => {
                let lowered = value.to_lowercase();
                if PLACEHOLDER_MARKERS.iter().any(|m| lowered.contains(m)) {
                    KeyState::Placeholder
                } else {
                    KeyState::Present
                }
            }
        }
    }
}

#[async_trait]
impl Agent for ApiKeyHunter {
    fn name(&self) -> &str {
        API_KEY_HUNTER
    }

    async fn run(&self) -> Result<RunOutcome> {
        let mut missing = Vec::new();
        let mut placeholders = Vec::new();
        let mut optional_missing = Vec::new();

        for key in &self.config.required {
            match self.inspect(key) {
                KeyState::Present => {}
                KeyState::Missing => missing.push(key.clone()),
                KeyState::Placeholder => placeholders.push(key.clone()),
            }
        }
        for key in &self.config.optional {
            if self.inspect(key) != KeyState::Present {
                optional_missing.push(key.clone());
            }
        }

        let details = serde_json::json!({
            "required": self.config.required.len(),
            "missing": missing,
            "placeholders": placeholders,
            "optionalMissing": optional_missing,
        });

        if missing.is_empty() && placeholders.is_empty() {
            Ok(RunOutcome::ok(format!(
                "{} required key(s) present",
                self.config.required.len()
            ))
            .with_details(details))
        } else {
            Ok(RunOutcome::failed(format!(
                "{} required key(s) missing or unset",
                missing.len() + placeholders.len()
            ))
            .with_details(details))
        }
    }
}
