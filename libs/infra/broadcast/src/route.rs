// [libs/infra/broadcast/src/route.rs]
//! HTTP -> WebSocket upgrade entry point for `GET /ws`.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::IntoResponse;
use pulse_domain::state::ClusterState;
use tracing::debug;

use crate::frame::Frame;
use crate::handler::handle_connection;
use crate::hub::BroadcastHub;

/// Anything the route needs beyond the hub itself — here, a way to read
/// the current authoritative state to seed a newly connected client.
#[derive(Clone)]
pub struct WsAppState {
    pub hub: BroadcastHub,
    pub current_state: std::sync::Arc<tokio::sync::RwLock<ClusterState>>,
}

pub async fn upgrade(websocket_upgrade: WebSocketUpgrade, State(state): State<WsAppState>) -> impl IntoResponse {
    debug!("negotiating websocket upgrade");
    websocket_upgrade.on_upgrade(move |socket| async move {
        let snapshot = Frame::snapshot(state.current_state.read().await.clone());
        handle_connection(socket, state.hub, snapshot).await;
    })
}
