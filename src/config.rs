use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::Level;

use crate::core::orchestrator::schedule::ScheduleEntry;

pub const CONFIG_FILE: &str = "bdbt-agents.toml";
pub const DEFAULT_PORT: u16 = 3001;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DashboardConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Per-agent cadence overrides, keyed by agent name.
    #[serde(default)]
    pub schedules: BTreeMap<String, ScheduleEntry>,

    #[serde(default)]
    pub agents: AgentsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_health_interval")]
    pub health_interval_secs: u64,

    /// When false the restart endpoint only acknowledges the request.
    #[serde(default)]
    pub restart_runs_agent: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AgentsConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub mcp: McpConfig,
    #[serde(default)]
    pub functionality: FunctionalityConfig,
    #[serde(default)]
    pub api_keys: ApiKeyConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
    #[serde(default)]
    pub error_handler: ErrorHandlerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default)]
    pub endpoints: Vec<String>,
    #[serde(default = "default_probe_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct McpConfig {
    /// `host:port` pairs of MCP servers.
    #[serde(default)]
    pub servers: Vec<String>,
    #[serde(default = "default_mcp_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FunctionalityConfig {
    #[serde(default)]
    pub checks: Vec<EndpointCheck>,
    #[serde(default = "default_probe_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct EndpointCheck {
    pub name: String,
    pub url: String,
    #[serde(default = "default_expect_status")]
    pub expect_status: u16,
    /// Substring the response body must contain.
    #[serde(default)]
    pub contains: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeyConfig {
    #[serde(default = "default_required_keys")]
    pub required: Vec<String>,
    #[serde(default)]
    pub optional: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PerformanceConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_samples")]
    pub samples: u32,
    #[serde(default = "default_degraded_ms")]
    pub degraded_ms: u64,
    #[serde(default = "default_critical_ms")]
    pub critical_ms: u64,
    #[serde(default = "default_probe_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorHandlerConfig {
    #[serde(default = "default_error_window")]
    pub window_secs: u64,
    #[serde(default = "default_max_errors")]
    pub max_errors: usize,
    #[serde(default = "default_error_history")]
    pub history: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_health_interval() -> u64 {
    30
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_probe_timeout() -> u64 {
    10
}
fn default_mcp_timeout() -> u64 {
    5
}
fn default_expect_status() -> u16 {
    200
}
fn default_required_keys() -> Vec<String> {
    vec![
        "VITE_SUPABASE_URL".to_string(),
        "VITE_SUPABASE_ANON_KEY".to_string(),
    ]
}
fn default_samples() -> u32 {
    3
}
fn default_degraded_ms() -> u64 {
    1500
}
fn default_critical_ms() -> u64 {
    5000
}
fn default_error_window() -> u64 {
    3600
}
fn default_max_errors() -> usize {
    10
}
fn default_error_history() -> usize {
    200
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            health_interval_secs: default_health_interval(),
            restart_runs_agent: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            timeout_secs: default_probe_timeout(),
        }
    }
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            timeout_secs: default_mcp_timeout(),
        }
    }
}

impl Default for FunctionalityConfig {
    fn default() -> Self {
        Self {
            checks: Vec::new(),
            timeout_secs: default_probe_timeout(),
        }
    }
}

impl Default for ApiKeyConfig {
    fn default() -> Self {
        Self {
            required: default_required_keys(),
            optional: Vec::new(),
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            url: None,
            samples: default_samples(),
            degraded_ms: default_degraded_ms(),
            critical_ms: default_critical_ms(),
            timeout_secs: default_probe_timeout(),
        }
    }
}

impl Default for ErrorHandlerConfig {
    fn default() -> Self {
        Self {
            window_secs: default_error_window(),
            max_errors: default_max_errors(),
            history: default_error_history(),
        }
    }
}

impl LoggingConfig {
    pub fn max_level(&self) -> Level {
        self.level.trim().parse().unwrap_or(Level::INFO)
    }
}

/// Values given on the command line; they win over file and environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServeFlags {
    pub config_path: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl DashboardConfig {
    /// Reads `path`, or `bdbt-agents.toml` in the working directory when no
    /// path is given. A missing default file yields the built-in defaults.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(CONFIG_FILE), false),
        };
        if !path.exists() {
            if explicit {
                bail!("config file not found: {}", path.display());
            }
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: DashboardConfig = toml::from_str(&content)
            .with_context(|| format!("invalid config in {}", path.display()))?;
        Ok(config)
    }

    /// `DASHBOARD_PORT` takes precedence over `PORT`. Unparseable ports are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for key in ["PORT", "DASHBOARD_PORT"] {
            if let Some(port) = lookup(key).and_then(|v| v.trim().parse().ok()) {
                self.server.port = port;
            }
        }
        if let Some(host) = lookup("DASHBOARD_HOST").filter(|h| !h.trim().is_empty()) {
            self.server.host = host.trim().to_string();
        }
        if let Some(level) = lookup("LOG_LEVEL").filter(|l| !l.trim().is_empty()) {
            self.logging.level = level;
        }
    }

    pub fn apply_flags(&mut self, flags: &ServeFlags) {
        if let Some(host) = &flags.host {
            self.server.host = host.clone();
        }
        if let Some(port) = flags.port {
            self.server.port = port;
        }
    }

    /// File, then environment, then flags.
    pub async fn resolve(flags: &ServeFlags) -> Result<Self> {
        let mut config = Self::load(flags.config_path.as_deref()).await?;
        config.apply_env(|key| std::env::var(key).ok());
        config.apply_flags(flags);
        Ok(config)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
