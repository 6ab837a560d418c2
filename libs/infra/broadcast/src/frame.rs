// [libs/infra/broadcast/src/frame.rs]
//! Wire protocol for the live broadcaster.

use pulse_domain::alert::Alert;
use pulse_domain::health::SourceHealth;
use pulse_domain::state::{ClusterState, StateDelta};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    Snapshot { state: Box<ClusterState> },
    Delta(StateDelta),
    Alert(Alert),
    Health { sources: SourceHealth },
    Ping,
}

impl Frame {
    pub fn snapshot(state: ClusterState) -> Self {
        Frame::Snapshot { state: Box::new(state) }
    }

    pub fn health(source: SourceHealth) -> Self {
        Frame::Health { sources: source }
    }

    pub fn is_snapshot(&self) -> bool {
        matches!(self, Frame::Snapshot { .. })
    }
}
