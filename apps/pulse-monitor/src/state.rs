// [apps/pulse-monitor/src/state.rs]
//! The composition root's shared application state, threaded through
//! every axum handler via `with_state`: one `Clone`-able struct
//! aggregating every long-lived handle the HTTP surface needs.

use std::sync::Arc;

use pulse_broadcast::{BroadcastHub, WsAppState};
use pulse_domain::state::ClusterState;
use pulse_metrics_ring::MetricsRing;
use pulse_notify_store::NotificationRepository;
use pulse_secure_config::EncryptionKey;
use tokio::sync::{mpsc, RwLock};

use crate::aggregator::AggregatorMessage;
use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub cluster_state: Arc<RwLock<ClusterState>>,
    pub hub: BroadcastHub,
    pub metrics_ring: Arc<MetricsRing>,
    pub notifications: Arc<NotificationRepository>,
    pub aggregator_tx: mpsc::UnboundedSender<AggregatorMessage>,
    pub config: Arc<AppConfig>,
    pub encryption_key: Arc<EncryptionKey>,
}

impl AppState {
    pub fn ws_state(&self) -> WsAppState {
        WsAppState { hub: self.hub.clone(), current_state: self.cluster_state.clone() }
    }
}
