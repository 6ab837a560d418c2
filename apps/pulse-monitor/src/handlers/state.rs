// [apps/pulse-monitor/src/handlers/state.rs]
//! `GET /state`: the full current `ClusterState`.

use axum::extract::State;
use axum::Json;
use pulse_domain::state::ClusterState;

use crate::state::AppState;

pub async fn get_state(State(state): State<AppState>) -> Json<ClusterState> {
    Json(state.cluster_state.read().await.clone())
}
