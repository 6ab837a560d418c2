// [libs/core/domain/src/backup.rs]
//! Backup snapshots and the VMID-collision detection they feed.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupType {
    Vm,
    Ct,
    Host,
}

/// `(sourcePbs, datastore, namespace, backupType, backupId, backupTime)`
/// is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSnapshot {
    pub source_pbs: String,
    pub datastore: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub backup_type: BackupType,
    pub backup_id: String,
    pub backup_time: DateTime<Utc>,
    pub size_bytes: u64,
    /// The raw `owner` token (`user@realm!token-name`), used by the
    /// aggregator's collision-resolution algorithm.
    pub owner: String,
    pub protected: bool,
    /// The node this snapshot was resolved to, if any.
    pub resolved_node: Option<String>,
}

fn default_namespace() -> String {
    "root".to_string()
}

impl BackupSnapshot {
    pub fn identity_key(&self) -> (String, String, String, BackupType, String, DateTime<Utc>) {
        (
            self.source_pbs.clone(),
            self.datastore.clone(),
            self.namespace.clone(),
            self.backup_type,
            self.backup_id.clone(),
            self.backup_time,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionSeverity {
    Critical,
    Warning,
}

impl CollisionSeverity {
    /// `critical` if the most recent contributing snapshot is less than 7
    /// days old, `warning` otherwise.
    pub fn from_age(most_recent: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        if now - most_recent < Duration::days(7) {
            CollisionSeverity::Critical
        } else {
            CollisionSeverity::Warning
        }
    }
}

/// Derived fact: two or more backup snapshots share `(backupType,
/// backupId)` but resolve to distinct nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmidCollision {
    pub backup_type: BackupType,
    pub backup_id: String,
    pub nodes: Vec<String>,
    pub severity: CollisionSeverity,
    pub most_recent_backup_time: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_is_critical_within_seven_days() {
        let now = Utc::now();
        assert_eq!(
            CollisionSeverity::from_age(now - Duration::days(1), now),
            CollisionSeverity::Critical
        );
        assert_eq!(
            CollisionSeverity::from_age(now - Duration::days(8), now),
            CollisionSeverity::Warning
        );
    }
}
