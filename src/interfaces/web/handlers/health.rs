use axum::{Json, extract::State};

use super::super::AppState;
use crate::core::orchestrator::StatusSnapshot;

pub async fn get_health(State(state): State<AppState>) -> Json<StatusSnapshot> {
    Json(state.orchestrator.get_status())
}
