// [libs/infra/source-client/src/mock.rs]
//! Synthetic source clients used when `PULSE_MOCK_MODE` is set. Generate
//! plausible fluctuating metrics instead of dialing a real PVE/PBS host.
//! Mock state is in-memory only and resets on every process start; this
//! implementation picks "reset" as the simpler, side-effect-free default
//! over persisting mock state across restarts.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;

use crate::client::{Snapshot, SourceClient};
use crate::errors::SourceClientError;
use crate::pbs::{BackupGroupSnapshot, DatastoreSnapshot, PbsSnapshot};
use crate::pve::{GuestSnapshot, NodeSnapshot, PveSnapshot};

pub struct MockPveClient {
    node_count: u32,
    guest_count: u32,
    tick: AtomicU64,
}

impl MockPveClient {
    pub fn new(node_count: u32, guest_count: u32) -> Self {
        Self { node_count, guest_count, tick: AtomicU64::new(0) }
    }

    fn wave(tick: u64, phase: u64, amplitude: f64, midpoint: f64) -> f64 {
        let radians = ((tick + phase) % 60) as f64 / 60.0 * std::f64::consts::TAU;
        midpoint + radians.sin() * amplitude
    }
}

#[async_trait]
impl SourceClient for MockPveClient {
    async fn snapshot(&self) -> Result<Snapshot, SourceClientError> {
        let tick = self.tick.fetch_add(1, Ordering::SeqCst);

        let nodes = (0..self.node_count)
            .map(|i| NodeSnapshot {
                node: format!("mock-node-{i}"),
                online: true,
                cpu: (Self::wave(tick, i as u64 * 7, 0.3, 0.4)).clamp(0.0, 1.0),
                maxcpu: 8,
                mem: (Self::wave(tick, i as u64 * 11, 2_000_000_000.0, 8_000_000_000.0)) as u64,
                maxmem: 16_000_000_000,
            })
            .collect();

        let guests = (0..self.guest_count)
            .map(|i| GuestSnapshot {
                vmid: 100 + i,
                name: format!("mock-guest-{i}"),
                node: format!("mock-node-{}", i % self.node_count.max(1)),
                status: "running".into(),
                guest_type: if i % 2 == 0 { "qemu".into() } else { "lxc".into() },
                cpu: (Self::wave(tick, i as u64 * 3, 0.2, 0.3)).clamp(0.0, 1.0),
                mem: (Self::wave(tick, i as u64 * 5, 500_000_000.0, 1_500_000_000.0)) as u64,
                maxmem: 4_000_000_000,
                disk: 10_000_000_000,
                maxdisk: 50_000_000_000,
                netin: tick * 1024,
                netout: tick * 512,
                tags: None,
            })
            .collect();

        Ok(Snapshot::Pve(PveSnapshot {
            cluster_name: Some("mock-cluster".into()),
            nodes,
            guests,
            storages: Vec::new(),
            node_errors: Default::default(),
        }))
    }
}

pub struct MockPbsClient {
    datastore_count: u32,
    tick: AtomicU64,
}

impl MockPbsClient {
    pub fn new(datastore_count: u32) -> Self {
        Self { datastore_count, tick: AtomicU64::new(0) }
    }
}

#[async_trait]
impl SourceClient for MockPbsClient {
    async fn snapshot(&self) -> Result<Snapshot, SourceClientError> {
        let tick = self.tick.fetch_add(1, Ordering::SeqCst);

        let datastores: Vec<DatastoreSnapshot> = (0..self.datastore_count)
            .map(|i| DatastoreSnapshot {
                store: format!("mock-store-{i}"),
                used: (tick * 1024 + i as u64 * 2048) % 500_000_000_000,
                total: 1_000_000_000_000,
            })
            .collect();

        let backups = datastores
            .iter()
            .map(|datastore| BackupGroupSnapshot {
                store: datastore.store.clone(),
                ns: "root".into(),
                backup_type: "vm".into(),
                backup_id: "100".into(),
                backup_time: Utc::now(),
                size: 10_000_000_000,
                owner: "mock@pbs".into(),
                protected: false,
            })
            .collect();

        Ok(Snapshot::Pbs(PbsSnapshot { datastores, backups }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_pbs_client_produces_a_pbs_snapshot() {
        let client = MockPbsClient::new(2);
        let Snapshot::Pbs(snapshot) = client.snapshot().await.unwrap() else {
            panic!("expected a PBS snapshot");
        };
        assert_eq!(snapshot.datastores.len(), 2);
        assert_eq!(snapshot.backups.len(), 2);
    }

    #[tokio::test]
    async fn mock_client_produces_requested_topology() {
        let client = MockPveClient::new(2, 4);
        let Snapshot::Pve(snapshot) = client.snapshot().await.unwrap() else {
            panic!("expected a PVE snapshot");
        };
        assert_eq!(snapshot.nodes.len(), 2);
        assert_eq!(snapshot.guests.len(), 4);
        for node in &snapshot.nodes {
            assert!(node.cpu >= 0.0 && node.cpu <= 1.0);
        }
    }
}
