use anyhow::{Context, Result, bail};
use console::style;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::config::{DashboardConfig, ServeFlags};
use crate::core::lifecycle::LifecycleManager;
use crate::core::orchestrator::{Orchestrator, StatusSnapshot};
use crate::core::terminal::{self, print_error, print_info, print_link, print_status};
use crate::interfaces::web::{DashboardServer, DashboardServerConfig};
use crate::logging;

fn print_help() {
    terminal::print_heading("BDBT Agents");
    println!(
        "  {:<10} {}",
        style("serve").green(),
        "Start the agent orchestrator and dashboard (default)"
    );
    println!(
        "  {:<10} {}",
        style("status").green(),
        "Print the status table of a running dashboard"
    );
    println!("  {:<10} {}", style("help").green(), "Show this message");
    println!(
        "\n  {:<22} {}",
        style("--config <path>").bold(),
        "Config file (default: bdbt-agents.toml)"
    );
    println!("  {:<22} {}", style("--host <addr>").bold(), "Bind / query host");
    println!("  {:<22} {}", style("--port <port>").bold(), "Bind / query port");
    println!(
        "\n {} {} <command> [flags]\n",
        style("Usage:").bold(),
        style("bdbt-agents").green()
    );
}

/// Reads `--config`, `--host` and `--port` starting at `start`. Unparsable
/// ports are reported rather than silently replaced.
pub(crate) fn parse_serve_flags(args: &[String], start: usize) -> Result<ServeFlags> {
    let mut flags = ServeFlags::default();
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    flags.config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--host" => {
                if i + 1 < args.len() {
                    flags.host = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--port" | "-p" => {
                if i + 1 < args.len() {
                    let port = args[i + 1]
                        .parse()
                        .with_context(|| format!("invalid port '{}'", args[i + 1]))?;
                    flags.port = Some(port);
                    i += 1;
                }
            }
            other => bail!("unknown flag '{}'", other),
        }
        i += 1;
    }
    Ok(flags)
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let cmd = args.get(1).map(String::as_str).unwrap_or("serve");

    match cmd {
        "serve" => serve(parse_serve_flags(&args, 2)?).await,
        "status" => status(parse_serve_flags(&args, 2)?).await,
        "help" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        // Bare flags mean `serve`.
        flag if flag.starts_with('-') => serve(parse_serve_flags(&args, 1)?).await,
        other => {
            print_error(&format!("Unknown command: {}", other));
            print_help();
            Ok(())
        }
    }
}

async fn serve(flags: ServeFlags) -> Result<()> {
    let config = DashboardConfig::resolve(&flags).await?;
    let log_tx = logging::init(config.logging.max_level());

    let orchestrator = Arc::new(Orchestrator::from_config(&config));
    let server = Arc::new(Mutex::new(DashboardServer::new(DashboardServerConfig {
        orchestrator: orchestrator.clone(),
        log_tx,
        host: config.server.host.clone(),
        port: config.server.port,
        restart_runs_agent: config.server.restart_runs_agent,
    })));

    let mut lifecycle = LifecycleManager::new();
    lifecycle.attach(server.clone());
    lifecycle.start().await?;

    let addr = server
        .lock()
        .await
        .local_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|| config.bind_addr());
    terminal::print_heading("BDBT agent orchestrator running");
    print_link("Dashboard", &format!("http://{}", addr));
    print_link("Health API", &format!("http://{}/api/health", addr));
    print_link("WebSocket", &format!("ws://{}/ws", addr));
    for (name, cadence) in orchestrator.cadences() {
        print_status(&name, &cadence.describe());
    }
    print_info("Press Ctrl+C to stop.");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;
    print_info("Shutting down agents...");
    lifecycle.shutdown().await?;
    terminal::print_goodbye();
    Ok(())
}

/// Address a client should use to reach a server bound to `host`.
fn query_host(host: &str) -> &str {
    match host {
        "0.0.0.0" | "::" | "[::]" => "127.0.0.1",
        other => other,
    }
}

async fn status(flags: ServeFlags) -> Result<()> {
    let config = DashboardConfig::resolve(&flags).await?;
    let url = format!(
        "http://{}:{}/api/health",
        query_host(&config.server.host),
        config.server.port
    );

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;
    let snapshot: StatusSnapshot = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("no dashboard reachable at {}", url))?
        .error_for_status()?
        .json()
        .await
        .context("unexpected response from /api/health")?;

    terminal::print_snapshot(&snapshot);
    Ok(())
}
