// [libs/core/domain/src/resources.rs]
//! Entity kinds that populate `ClusterState`.
//!
//! Every entity carries its owning `instance_id` (the source that produced
//! it) and a `stale` flag: per the staleness invariant, an entity whose
//! owning source is offline keeps its last-known values and is flagged
//! stale rather than removed.

use serde::{Deserialize, Serialize};

use crate::identity::ResourceId;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Utilization {
    pub cpu_fraction: f64,
    pub mem_used_bytes: u64,
    pub mem_total_bytes: u64,
    pub disk_used_bytes: u64,
    pub disk_total_bytes: u64,
    pub net_in_bytes_per_sec: f64,
    pub net_out_bytes_per_sec: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    Stopped,
    Paused,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: ResourceId,
    pub name: String,
    pub online: bool,
    pub utilization: Utilization,
    pub stale: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vm {
    pub id: ResourceId,
    pub vmid: u32,
    pub name: String,
    pub state: RunState,
    pub utilization: Utilization,
    pub tags: Vec<String>,
    pub stale: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Container {
    pub id: ResourceId,
    pub ctid: u32,
    pub name: String,
    pub state: RunState,
    pub utilization: Utilization,
    pub tags: Vec<String>,
    pub stale: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Storage {
    pub id: ResourceId,
    pub name: String,
    pub storage_type: String,
    pub used_bytes: u64,
    pub total_bytes: u64,
    pub shared: bool,
    pub stale: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PbsInstance {
    pub id: ResourceId,
    pub name: String,
    pub datastores: Vec<String>,
    pub stale: bool,
}

/// A bare-metal host reporting through the (out-of-scope) agent binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    pub id: ResourceId,
    pub hostname: String,
    pub utilization: Utilization,
    pub stale: bool,
}
