use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use tracing::{info, warn};

use super::super::AppState;
use crate::core::orchestrator::AgentStatus;

pub async fn get_agents(State(state): State<AppState>) -> Json<Vec<(String, AgentStatus)>> {
    Json(state.orchestrator.get_status().agents)
}

/// Acknowledges a restart request. Only triggers an immediate run when
/// `restart_runs_agent` is enabled.
pub async fn restart_agent(
    Path(agent): Path<String>,
    State(state): State<AppState>,
) -> (StatusCode, Json<serde_json::Value>) {
    if !state.orchestrator.has_agent(&agent) {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "success": false,
                "error": format!("Unknown agent '{}'", agent)
            })),
        );
    }

    info!("Restart requested for agent [{}]", agent);
    if state.restart_runs_agent {
        let orchestrator = state.orchestrator.clone();
        let name = agent.clone();
        tokio::spawn(async move {
            if let Err(e) = orchestrator.run_now(&name).await {
                warn!("Restart run for [{}] failed: {}", name, e);
            }
        });
    }

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "success": true,
            "message": format!("Agent {} restart initiated", agent)
        })),
    )
}
