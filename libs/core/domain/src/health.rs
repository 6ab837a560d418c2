// [libs/core/domain/src/health.rs]
//! Per-source health tracked inside `ClusterState`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Online,
    /// Offline for more than 3 consecutive poll intervals; owned entities
    /// are flagged `stale` but retained.
    Offline,
    /// Offline for more than 5 minutes; entities stay visible with a
    /// banner flag, never silently removed.
    Degraded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceHealth {
    pub source_id: String,
    pub status: SourceStatus,
    pub consecutive_failures: u32,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub offline_since: Option<DateTime<Utc>>,
}

impl SourceHealth {
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            status: SourceStatus::Online,
            consecutive_failures: 0,
            last_success_at: None,
            last_error: None,
            offline_since: None,
        }
    }
}
