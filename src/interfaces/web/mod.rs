mod handlers;
mod router;
mod socket;

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_stream::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::core::lifecycle::LifecycleComponent;
use crate::core::orchestrator::Orchestrator;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) orchestrator: Arc<Orchestrator>,
    pub(crate) log_tx: tokio::sync::broadcast::Sender<String>,
    pub(crate) restart_runs_agent: bool,
    pub(crate) port: u16,
    pub(crate) shutdown: CancellationToken,
}

pub struct DashboardServerConfig {
    pub orchestrator: Arc<Orchestrator>,
    pub log_tx: tokio::sync::broadcast::Sender<String>,
    pub host: String,
    pub port: u16,
    pub restart_runs_agent: bool,
}

/// HTTP + WebSocket front for one orchestrator. Starting it starts the
/// orchestrator; shutting it down stops the orchestrator first.
pub struct DashboardServer {
    orchestrator: Arc<Orchestrator>,
    log_tx: tokio::sync::broadcast::Sender<String>,
    host: String,
    port: u16,
    restart_runs_agent: bool,
    shutdown: CancellationToken,
    local_addr: Option<SocketAddr>,
    serve_task: Option<JoinHandle<()>>,
}

impl DashboardServer {
    pub fn new(config: DashboardServerConfig) -> Self {
        Self {
            orchestrator: config.orchestrator,
            log_tx: config.log_tx,
            host: config.host,
            port: config.port,
            restart_runs_agent: config.restart_runs_agent,
            shutdown: CancellationToken::new(),
            local_addr: None,
            serve_task: None,
        }
    }

    pub fn orchestrator(&self) -> Arc<Orchestrator> {
        self.orchestrator.clone()
    }

    /// Address actually bound; set once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

async fn sse_logs_endpoint(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.log_tx.subscribe();
    let stream = BroadcastStream::new(receiver).map(|msg| match msg {
        Ok(line) => Ok(Event::default().data(line)),
        Err(_) => Ok(Event::default().data("Log stream lagged")),
    });

    Sse::new(stream)
}

#[async_trait]
impl LifecycleComponent for DashboardServer {
    async fn on_init(&mut self) -> Result<()> {
        info!("Dashboard server initializing...");
        Ok(())
    }

    async fn on_start(&mut self) -> Result<()> {
        let addr = format!("{}:{}", self.host, self.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind dashboard to {}", addr))?;
        let local_addr = listener.local_addr()?;

        self.orchestrator.start().await?;

        let state = AppState {
            orchestrator: self.orchestrator.clone(),
            log_tx: self.log_tx.clone(),
            restart_runs_agent: self.restart_runs_agent,
            port: local_addr.port(),
            shutdown: self.shutdown.clone(),
        };
        let app = router::build_router(state);
        let shutdown = self.shutdown.clone();

        self.serve_task = Some(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await
            {
                error!("Dashboard server crashed: {}", e);
            }
        }));
        self.local_addr = Some(local_addr);
        info!("Dashboard running at http://{}", local_addr);
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        info!("Dashboard server shutting down...");
        self.orchestrator.stop().await;
        self.shutdown.cancel();
        if let Some(task) = self.serve_task.take()
            && tokio::time::timeout(Duration::from_secs(5), task).await.is_err()
        {
            warn!("Dashboard server did not drain within 5s");
        }
        Ok(())
    }
}
