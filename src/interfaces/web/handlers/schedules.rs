use axum::{Json, extract::State};

use super::super::AppState;

pub async fn get_schedules(State(state): State<AppState>) -> Json<serde_json::Value> {
    let schedules: Vec<serde_json::Value> = state
        .orchestrator
        .cadences()
        .into_iter()
        .map(|(agent, cadence)| {
            serde_json::json!({
                "agent": agent,
                "cadence": cadence.describe(),
            })
        })
        .collect();

    Json(serde_json::json!({
        "running": state.orchestrator.is_running().await,
        "schedules": schedules
    }))
}
