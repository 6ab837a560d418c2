// [apps/pulse-monitor/src/aggregator.rs]
//! The State Aggregator: single-writer merge of per-source snapshots
//! into `ClusterState`, staleness tracking, change detection, and
//! fan-out to the broadcaster and alert engine.
//!
//! Mutation is serialized by construction: every caller — the poller
//! scheduler and the alert engine — talks to this actor through one
//! `mpsc` channel, and only the task running [`Aggregator::run`] ever
//! takes the write half of `state`. Readers (HTTP handlers, the
//! WebSocket route) take the read half directly.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use pulse_broadcast::{BroadcastHub, Frame};
use pulse_domain::alert::Alert;
use pulse_domain::backup::BackupSnapshot;
use pulse_domain::health::{SourceHealth, SourceStatus};
use pulse_domain::identity::ResourceId;
use pulse_domain::resources::{Container, Node, RunState, Storage, Utilization, Vm};
use pulse_domain::state::{ClusterState, EntityChange, StateDelta};
use pulse_metrics_ring::MetricsRing;
use pulse_source_client::Snapshot;
use tokio::sync::{mpsc, RwLock};
use tracing::{info, instrument, warn};

use crate::vmid;

/// Offline longer than this many consecutive failed polls flags owned
/// entities `stale`.
const STALE_AFTER_CONSECUTIVE_FAILURES: u32 = 3;
/// Offline longer than this wall-clock duration escalates a source to
/// `degraded`.
fn degraded_after() -> ChronoDuration {
    ChronoDuration::minutes(5)
}

pub enum AggregatorMessage {
    PollSuccess { source_id: String, snapshot: Snapshot, received_at: DateTime<Utc> },
    PollFailure { source_id: String, error: String, received_at: DateTime<Utc> },
    AlertUpdate { started: Vec<Alert>, resolved: Vec<String> },
    /// `POST /alerts/{id}/ack`. Routed through the aggregator since it is
    /// the sole writer of `active_alerts`.
    AckAlert(String),
    /// A non-source failure (e.g. the notification queue rejecting an
    /// enqueue) reported under a pseudo source id so it surfaces on the
    /// same health projection a real source's outage would.
    SourceDegraded { source_id: String, error: String, at: DateTime<Utc> },
}

pub struct Aggregator {
    state: Arc<RwLock<ClusterState>>,
    hub: BroadcastHub,
    metrics_ring: Arc<MetricsRing>,
    alert_state_tx: mpsc::UnboundedSender<Arc<ClusterState>>,
    deltas_since_snapshot: u32,
    full_snapshot_every_n_deltas: u32,
}

impl Aggregator {
    /// Builds the aggregator and hands back the shared, read-lockable
    /// `ClusterState` handle consumers (HTTP handlers, the WebSocket
    /// upgrade route) read from directly.
    pub fn new(
        hub: BroadcastHub,
        metrics_ring: Arc<MetricsRing>,
        alert_state_tx: mpsc::UnboundedSender<Arc<ClusterState>>,
        full_snapshot_every_n_deltas: u32,
    ) -> (Self, Arc<RwLock<ClusterState>>) {
        let state = Arc::new(RwLock::new(ClusterState::new()));
        (
            Self { state: state.clone(), hub, metrics_ring, alert_state_tx, deltas_since_snapshot: 0, full_snapshot_every_n_deltas },
            state,
        )
    }

    pub async fn run(mut self, mut receiver: mpsc::UnboundedReceiver<AggregatorMessage>) {
        while let Some(message) = receiver.recv().await {
            match message {
                AggregatorMessage::PollSuccess { source_id, snapshot, received_at } => {
                    self.apply_success(&source_id, snapshot, received_at).await
                }
                AggregatorMessage::PollFailure { source_id, error, received_at } => {
                    self.apply_failure(&source_id, &error, received_at).await
                }
                AggregatorMessage::AlertUpdate { started, resolved } => self.apply_alert_update(started, resolved).await,
                AggregatorMessage::AckAlert(alert_id) => self.apply_ack(&alert_id).await,
                AggregatorMessage::SourceDegraded { source_id, error, at } => self.apply_failure(&source_id, &error, at).await,
            }
        }
        info!("aggregator channel closed, shutting down");
    }

    async fn apply_ack(&mut self, alert_id: &str) {
        let mut state = self.state.write().await;
        if let Some(alert) = state.active_alerts.get_mut(alert_id) {
            alert.acknowledged = true;
        }
    }

    #[instrument(skip(self, snapshot))]
    async fn apply_success(&mut self, source_id: &str, snapshot: Snapshot, received_at: DateTime<Utc>) {
        let mut state = self.state.write().await;
        let mut changes = Vec::new();

        match snapshot {
            Snapshot::Pve(snapshot) => merge_pve(&mut state, source_id, snapshot, &mut changes, &self.metrics_ring, received_at),
            Snapshot::Pbs(snapshot) => merge_pbs(&mut state, source_id, snapshot, &mut changes, received_at),
        }

        record_success(&mut state, source_id, received_at);
        state.last_updated = Some(received_at);

        let delta = StateDelta { source_id: source_id.to_string(), at: received_at, changes };
        self.emit(&mut state, delta).await;
    }

    #[instrument(skip(self))]
    async fn apply_failure(&mut self, source_id: &str, error: &str, received_at: DateTime<Utc>) {
        let mut state = self.state.write().await;
        record_failure(&mut state, source_id, error, received_at);

        let health = state.source_health.get(source_id).cloned();
        if let Some(health) = health {
            self.hub.publish(Frame::health(health));
        }
    }

    async fn apply_alert_update(&mut self, started: Vec<Alert>, resolved: Vec<String>) {
        let mut state = self.state.write().await;
        let mut changes = Vec::new();

        for alert in started {
            changes.push(EntityChange::Added {
                entity_kind: "alert".to_string(),
                entity_id: alert.id.clone(),
                payload: serde_json::to_value(&alert).expect("alert is always serializable"),
            });
            self.hub.publish(Frame::Alert(alert.clone()));
            state.active_alerts.insert(alert.id.clone(), alert);
        }

        for alert_id in resolved {
            if let Some(mut alert) = state.active_alerts.remove(&alert_id) {
                alert.resolved_at = Some(Utc::now());
                changes.push(EntityChange::Removed { entity_kind: "alert".to_string(), entity_id: alert_id });
                self.hub.publish(Frame::Alert(alert));
            }
        }

        if changes.is_empty() {
            return;
        }
        let delta = StateDelta { source_id: "alert-engine".to_string(), at: Utc::now(), changes };
        self.emit(&mut state, delta).await;
    }

    /// Publishes the delta, upgrading to a full snapshot every Nth delta
    /// (default 100) to bound client drift, then forwards the merged
    /// state to the alert engine for evaluation.
    async fn emit(&mut self, state: &mut ClusterState, delta: StateDelta) {
        if !delta.changes.is_empty() {
            self.deltas_since_snapshot += 1;
        }

        if self.deltas_since_snapshot >= self.full_snapshot_every_n_deltas {
            self.hub.publish(Frame::snapshot(state.clone()));
            self.deltas_since_snapshot = 0;
        } else if !delta.changes.is_empty() {
            self.hub.publish(Frame::Delta(delta));
        }

        let _ = self.alert_state_tx.send(Arc::new(state.clone()));
    }
}

fn record_success(state: &mut ClusterState, source_id: &str, now: DateTime<Utc>) {
    let health = state.source_health.entry(source_id.to_string()).or_insert_with(|| SourceHealth::new(source_id));
    health.consecutive_failures = 0;
    health.last_error = None;
    health.last_success_at = Some(now);
    health.offline_since = None;
    health.status = SourceStatus::Online;
    set_stale_for_source(state, source_id, false);
}

fn record_failure(state: &mut ClusterState, source_id: &str, error: &str, now: DateTime<Utc>) {
    let health = state.source_health.entry(source_id.to_string()).or_insert_with(|| SourceHealth::new(source_id));
    health.consecutive_failures += 1;
    health.last_error = Some(error.to_string());
    if health.offline_since.is_none() {
        health.offline_since = Some(now);
    }

    let offline_for = now - health.offline_since.expect("just set above");
    health.status = if offline_for >= degraded_after() {
        SourceStatus::Degraded
    } else if health.consecutive_failures > STALE_AFTER_CONSECUTIVE_FAILURES {
        SourceStatus::Offline
    } else {
        SourceStatus::Online
    };

    if !matches!(health.status, SourceStatus::Online) {
        warn!(source_id, status = ?health.status, "source offline, flagging owned entities stale");
        set_stale_for_source(state, source_id, true);
    }
}

fn set_stale_for_source(state: &mut ClusterState, source_id: &str, stale: bool) {
    for node in state.nodes.values_mut().filter(|n| n.id.instance_id == source_id) {
        node.stale = stale;
    }
    for vm in state.vms.values_mut().filter(|v| v.id.instance_id == source_id) {
        vm.stale = stale;
    }
    for container in state.containers.values_mut().filter(|c| c.id.instance_id == source_id) {
        container.stale = stale;
    }
    for storage in state.storages.values_mut().filter(|s| s.id.instance_id == source_id) {
        storage.stale = stale;
    }
    for pbs in state.pbs_instances.values_mut().filter(|p| p.id.instance_id == source_id) {
        pbs.stale = stale;
    }
}

fn merge_pve(
    state: &mut ClusterState,
    source_id: &str,
    snapshot: pulse_source_client::PveSnapshot,
    changes: &mut Vec<EntityChange>,
    metrics_ring: &MetricsRing,
    received_at: DateTime<Utc>,
) {
    let node_entries: Vec<(ResourceId, Node)> = snapshot
        .nodes
        .iter()
        .map(|node| {
            let id = ResourceId::new(source_id, &node.node, &node.node);
            let utilization = Utilization {
                cpu_fraction: node.cpu,
                mem_used_bytes: node.mem,
                mem_total_bytes: node.maxmem,
                disk_used_bytes: 0,
                disk_total_bytes: 0,
                net_in_bytes_per_sec: 0.0,
                net_out_bytes_per_sec: 0.0,
            };
            metrics_ring.record(id.clone(), "cpu", received_at, node.cpu);
            metrics_ring.record(id.clone(), "mem", received_at, node.mem as f64);
            (id.clone(), Node { id, name: node.node.clone(), online: node.online, utilization, stale: false })
        })
        .collect();
    diff_and_replace(&mut state.nodes, source_id, node_entries, "node", changes);

    let mut vm_entries = Vec::new();
    let mut container_entries = Vec::new();
    for guest in &snapshot.guests {
        let id = ResourceId::new(source_id, &guest.node, guest.vmid.to_string());
        let utilization = Utilization {
            cpu_fraction: guest.cpu,
            mem_used_bytes: guest.mem,
            mem_total_bytes: guest.maxmem,
            disk_used_bytes: guest.disk,
            disk_total_bytes: guest.maxdisk,
            net_in_bytes_per_sec: guest.netin as f64,
            net_out_bytes_per_sec: guest.netout as f64,
        };
        let tags = guest.tags.as_deref().map(parse_tags).unwrap_or_default();
        let run_state = parse_run_state(&guest.status);
        metrics_ring.record(id.clone(), "cpu", received_at, guest.cpu);
        metrics_ring.record(id.clone(), "mem", received_at, guest.mem as f64);

        if guest.guest_type == "lxc" {
            container_entries.push((
                id.clone(),
                Container { id, ctid: guest.vmid, name: guest.name.clone(), state: run_state, utilization, tags, stale: false },
            ));
        } else {
            vm_entries.push((
                id.clone(),
                Vm { id, vmid: guest.vmid, name: guest.name.clone(), state: run_state, utilization, tags, stale: false },
            ));
        }
    }
    diff_and_replace(&mut state.vms, source_id, vm_entries, "vm", changes);
    diff_and_replace(&mut state.containers, source_id, container_entries, "container", changes);

    let storage_entries: Vec<(ResourceId, Storage)> = snapshot
        .storages
        .iter()
        .map(|storage| {
            let id = ResourceId::new(source_id, &storage.node, &storage.storage);
            (
                id.clone(),
                Storage {
                    id,
                    name: storage.storage.clone(),
                    storage_type: storage.storage_type.clone(),
                    used_bytes: storage.used,
                    total_bytes: storage.total,
                    shared: storage.shared != 0,
                    stale: false,
                },
            )
        })
        .collect();
    diff_and_replace(&mut state.storages, source_id, storage_entries, "storage", changes);

    for (node_name, error) in &snapshot.node_errors {
        warn!(source_id, node = node_name, %error, "partial failure refreshing node status, prior values retained");
    }
}

fn merge_pbs(
    state: &mut ClusterState,
    source_id: &str,
    snapshot: pulse_source_client::PbsSnapshot,
    changes: &mut Vec<EntityChange>,
    received_at: DateTime<Utc>,
) {
    let datastores: Vec<String> = snapshot.datastores.iter().map(|d| d.store.clone()).collect();
    let id = ResourceId::new(source_id, "pbs", source_id);
    let instance = pulse_domain::resources::PbsInstance { id: id.clone(), name: source_id.to_string(), datastores, stale: false };
    diff_and_replace(&mut state.pbs_instances, source_id, vec![(id, instance)], "pbs_instance", changes);

    let known_node_names: Vec<String> = state.nodes.values().map(|n| n.name.clone()).collect();

    state.backup_snapshots.retain(|b| b.source_pbs != source_id);
    for group in &snapshot.backups {
        let resolved_node = vmid::resolve_node(&group.owner, &known_node_names, || None);
        state.backup_snapshots.push(BackupSnapshot {
            source_pbs: source_id.to_string(),
            datastore: group.store.clone(),
            namespace: group.ns.clone(),
            backup_type: parse_backup_type(&group.backup_type),
            backup_id: group.backup_id.clone(),
            backup_time: group.backup_time,
            size_bytes: group.size,
            owner: group.owner.clone(),
            protected: group.protected,
            resolved_node,
        });
    }

    state.vmid_collisions = vmid::detect_collisions(&state.backup_snapshots, received_at);
}

/// Replaces `map`'s entries owned by `source_id` with `new_entries`,
/// diffing by content hash so unchanged entities don't produce noise
/// in the emitted delta.
fn diff_and_replace<T: Clone + serde::Serialize>(
    map: &mut BTreeMap<ResourceId, T>,
    source_id: &str,
    new_entries: Vec<(ResourceId, T)>,
    entity_kind: &str,
    changes: &mut Vec<EntityChange>,
) {
    let previously_owned: Vec<ResourceId> = map.keys().filter(|id| id.instance_id == source_id).cloned().collect();
    let mut still_present = std::collections::HashSet::new();

    for (id, entity) in new_entries {
        still_present.insert(id.clone());
        let payload = serde_json::to_value(&entity).expect("domain entities are always serializable");

        match map.get(&id) {
            Some(existing) if pulse_domain::hashing::content_hash(existing) == pulse_domain::hashing::content_hash(&entity) => {
                // unchanged, no delta entry
            }
            Some(_) => {
                changes.push(EntityChange::Updated { entity_kind: entity_kind.to_string(), entity_id: id.display_id(), payload });
            }
            None => {
                changes.push(EntityChange::Added { entity_kind: entity_kind.to_string(), entity_id: id.display_id(), payload });
            }
        }
        map.insert(id, entity);
    }

    for id in previously_owned {
        if !still_present.contains(&id) {
            changes.push(EntityChange::Removed { entity_kind: entity_kind.to_string(), entity_id: id.display_id() });
            map.remove(&id);
        }
    }
}

fn parse_run_state(status: &str) -> RunState {
    match status {
        "running" => RunState::Running,
        "stopped" => RunState::Stopped,
        "paused" => RunState::Paused,
        _ => RunState::Unknown,
    }
}

fn parse_backup_type(value: &str) -> pulse_domain::backup::BackupType {
    match value {
        "ct" => pulse_domain::backup::BackupType::Ct,
        "host" => pulse_domain::backup::BackupType::Host,
        _ => pulse_domain::backup::BackupType::Vm,
    }
}

fn parse_tags(raw: &str) -> Vec<String> {
    raw.split(';').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_metrics_ring::MetricsRing;
    use pulse_source_client::pve::{GuestSnapshot, NodeSnapshot, PveSnapshot};

    fn pve_snapshot_with_one_node() -> PveSnapshot {
        PveSnapshot {
            cluster_name: Some("dc1".into()),
            nodes: vec![NodeSnapshot { node: "node1".into(), online: true, cpu: 0.42, maxcpu: 8, mem: 4_000_000_000, maxmem: 16_000_000_000 }],
            guests: vec![GuestSnapshot {
                vmid: 100,
                name: "web-1".into(),
                node: "node1".into(),
                status: "running".into(),
                guest_type: "qemu".into(),
                cpu: 0.1,
                mem: 512_000_000,
                maxmem: 2_000_000_000,
                disk: 1_000_000,
                maxdisk: 10_000_000,
                netin: 100,
                netout: 50,
                tags: Some("prod;web".into()),
            }],
            storages: vec![],
            node_errors: Default::default(),
        }
    }

    #[tokio::test]
    async fn first_merge_produces_added_changes_for_every_entity() {
        let hub = BroadcastHub::new();
        let metrics_ring = Arc::new(MetricsRing::new());
        let (alert_tx, _alert_rx) = mpsc::unbounded_channel();
        let (aggregator, state) = Aggregator::new(hub, metrics_ring, alert_tx, 100);

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(aggregator.run(rx));

        tx.send(AggregatorMessage::PollSuccess {
            source_id: "pve-a".into(),
            snapshot: Snapshot::Pve(pve_snapshot_with_one_node()),
            received_at: Utc::now(),
        })
        .unwrap();
        drop(tx);

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let guard = state.read().await;
        assert_eq!(guard.nodes.len(), 1);
        assert_eq!(guard.vms.len(), 1);
        assert!(guard.source_health.get("pve-a").map(|h| h.status == SourceStatus::Online).unwrap_or(false));
    }

    #[tokio::test]
    async fn repeated_failures_flag_entities_stale_after_threshold() {
        let hub = BroadcastHub::new();
        let metrics_ring = Arc::new(MetricsRing::new());
        let (alert_tx, _alert_rx) = mpsc::unbounded_channel();
        let (aggregator, state) = Aggregator::new(hub, metrics_ring, alert_tx, 100);

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(aggregator.run(rx));

        tx.send(AggregatorMessage::PollSuccess {
            source_id: "pve-a".into(),
            snapshot: Snapshot::Pve(pve_snapshot_with_one_node()),
            received_at: Utc::now(),
        })
        .unwrap();

        for _ in 0..4 {
            tx.send(AggregatorMessage::PollFailure { source_id: "pve-a".into(), error: "timeout".into(), received_at: Utc::now() }).unwrap();
        }
        drop(tx);

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let guard = state.read().await;
        let health = guard.source_health.get("pve-a").unwrap();
        assert_eq!(health.status, SourceStatus::Offline);
        assert!(guard.nodes.values().all(|n| n.stale));
    }
}
