// [libs/core/domain/src/state.rs]
//! `ClusterState`, the authoritative in-memory snapshot, and the
//! `StateDelta` the aggregator emits after each merge.
//!
//! This crate only defines the shape of the state; the merge algorithm
//! that mutates it lives in the `pulse-monitor` application crate, which
//! is the single writer.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alert::Alert;
use crate::backup::{BackupSnapshot, VmidCollision};
use crate::health::SourceHealth;
use crate::identity::ResourceId;
use crate::resources::{Container, Host, Node, PbsInstance, Storage, Vm};

/// The authoritative cluster-wide snapshot. Keyed maps use `ResourceId` (or
/// a backup's identity tuple rendered to a string) so repeated merges
/// replace entries in place without reallocating the whole collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterState {
    pub last_updated: Option<DateTime<Utc>>,
    pub nodes: BTreeMap<ResourceId, Node>,
    pub vms: BTreeMap<ResourceId, Vm>,
    pub containers: BTreeMap<ResourceId, Container>,
    pub storages: BTreeMap<ResourceId, Storage>,
    pub pbs_instances: BTreeMap<ResourceId, PbsInstance>,
    pub backup_snapshots: Vec<BackupSnapshot>,
    pub hosts: BTreeMap<ResourceId, Host>,
    pub active_alerts: BTreeMap<String, Alert>,
    pub source_health: BTreeMap<String, SourceHealth>,
    pub vmid_collisions: Vec<VmidCollision>,
}

impl ClusterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes every entity owned by `source_id`. Used when a source is
    /// deleted through config, never on a mere poll failure (entities
    /// survive poll failures; they are flagged stale instead).
    pub fn purge_source(&mut self, source_id: &str) {
        self.nodes.retain(|id, _| id.instance_id != source_id);
        self.vms.retain(|id, _| id.instance_id != source_id);
        self.containers.retain(|id, _| id.instance_id != source_id);
        self.storages.retain(|id, _| id.instance_id != source_id);
        self.pbs_instances.retain(|id, _| id.instance_id != source_id);
        self.hosts.retain(|id, _| id.instance_id != source_id);
        self.backup_snapshots.retain(|b| b.source_pbs != source_id);
        self.source_health.remove(source_id);
    }
}

/// One entity's fate within a merge, tagged by kind so a broadcaster
/// client can route it without inspecting the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EntityChange {
    Added { entity_kind: String, entity_id: String, payload: serde_json::Value },
    Updated { entity_kind: String, entity_id: String, payload: serde_json::Value },
    Removed { entity_kind: String, entity_id: String },
}

/// Incremental change description emitted between full snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateDelta {
    pub source_id: String,
    pub at: DateTime<Utc>,
    pub changes: Vec<EntityChange>,
}

impl StateDelta {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{RunState, Utilization};

    fn util() -> Utilization {
        Utilization {
            cpu_fraction: 0.1,
            mem_used_bytes: 0,
            mem_total_bytes: 0,
            disk_used_bytes: 0,
            disk_total_bytes: 0,
            net_in_bytes_per_sec: 0.0,
            net_out_bytes_per_sec: 0.0,
        }
    }

    #[test]
    fn purge_source_only_removes_owned_entities() {
        let mut state = ClusterState::new();
        let owned = ResourceId::new("pve-a", "node1", "100");
        let other = ResourceId::new("pve-b", "node1", "100");
        state.vms.insert(
            owned.clone(),
            Vm { id: owned.clone(), vmid: 100, name: "a".into(), state: RunState::Running, utilization: util(), tags: vec![], stale: false },
        );
        state.vms.insert(
            other.clone(),
            Vm { id: other.clone(), vmid: 100, name: "b".into(), state: RunState::Running, utilization: util(), tags: vec![], stale: false },
        );

        state.purge_source("pve-a");

        assert!(!state.vms.contains_key(&owned));
        assert!(state.vms.contains_key(&other));
    }
}
