// [apps/pulse-monitor/src/vmid.rs]
//! Backup-to-node resolution and VMID collision detection. Pure
//! functions; the aggregator calls these while merging a PBS snapshot
//! and owns the side effects.

use std::collections::HashMap;

use pulse_domain::backup::{BackupSnapshot, CollisionSeverity, VmidCollision};
use chrono::{DateTime, Utc};

/// Attempts to attribute a backup snapshot's `owner` token to one of
/// `node_names` by convention: the token-name segment
/// (`user@realm!token-name`) contains a node's name. Case-insensitive,
/// since Proxmox token names are frequently lowercased regardless of
/// the node's declared hostname casing.
pub fn resolve_by_owner_suffix<'a>(owner: &str, node_names: &'a [String]) -> Option<&'a str> {
    let token_name = owner.rsplit('!').next()?;
    let token_name_lower = token_name.to_lowercase();
    node_names.iter().find(|node| token_name_lower.contains(&node.to_lowercase())).map(String::as_str)
}

/// Parses a `client.log.blob`'s `Client name: <node>` field, the PBS
/// client's self-reported identity recorded at backup time. Used only
/// as a fallback when owner-suffix resolution fails.
pub fn resolve_by_client_log_blob(blob: &str) -> Option<String> {
    blob.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if key.trim().eq_ignore_ascii_case("Client name") {
            let value = value.trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
        None
    })
}

/// Full resolution order for one backup snapshot's owning node.
/// `fetch_log_blob` is only invoked if owner-suffix resolution fails,
/// since the blob read is an extra on-demand round trip to PBS.
pub fn resolve_node(owner: &str, node_names: &[String], fetch_log_blob: impl FnOnce() -> Option<String>) -> Option<String> {
    if let Some(found) = resolve_by_owner_suffix(owner, node_names) {
        return Some(found.to_string());
    }
    fetch_log_blob().as_deref().and_then(resolve_by_client_log_blob)
}

/// Scans resolved backup snapshots for VMID/CTID collisions: two or
/// more snapshots sharing `(backup_type, backup_id)` but resolved to
/// distinct nodes.
pub fn detect_collisions(snapshots: &[BackupSnapshot], now: DateTime<Utc>) -> Vec<VmidCollision> {
    let mut groups: HashMap<(pulse_domain::backup::BackupType, String), Vec<&BackupSnapshot>> = HashMap::new();
    for snapshot in snapshots {
        groups.entry((snapshot.backup_type, snapshot.backup_id.clone())).or_default().push(snapshot);
    }

    groups
        .into_iter()
        .filter_map(|((backup_type, backup_id), members)| {
            let mut nodes: Vec<String> = members.iter().filter_map(|m| m.resolved_node.clone()).collect();
            nodes.sort();
            nodes.dedup();
            if nodes.len() < 2 {
                return None;
            }

            let most_recent = members.iter().map(|m| m.backup_time).max().unwrap_or(now);
            Some(VmidCollision {
                backup_type,
                backup_id,
                nodes,
                severity: CollisionSeverity::from_age(most_recent, now),
                most_recent_backup_time: most_recent,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_domain::backup::BackupType;

    fn snapshot(backup_id: &str, resolved_node: Option<&str>, backup_time: DateTime<Utc>) -> BackupSnapshot {
        BackupSnapshot {
            source_pbs: "pbs-1".into(),
            datastore: "store1".into(),
            namespace: "root".into(),
            backup_type: BackupType::Vm,
            backup_id: backup_id.into(),
            backup_time,
            size_bytes: 1024,
            owner: "root@pam!pulse-node1".into(),
            protected: false,
            resolved_node: resolved_node.map(str::to_string),
        }
    }

    #[test]
    fn owner_suffix_matches_containing_node_name() {
        let nodes = vec!["node1".to_string(), "node2".to_string()];
        assert_eq!(resolve_by_owner_suffix("root@pam!pulse-node1", &nodes), Some("node1"));
    }

    #[test]
    fn owner_suffix_returns_none_when_no_node_matches() {
        let nodes = vec!["node1".to_string(), "node2".to_string()];
        assert_eq!(resolve_by_owner_suffix("root@pam!pulse-generic", &nodes), None);
    }

    #[test]
    fn client_log_blob_extracts_client_name_field() {
        let blob = "Archive name: vm/100\nClient name: node3\nBackup time: 2024-01-01";
        assert_eq!(resolve_by_client_log_blob(blob), Some("node3".to_string()));
    }

    #[test]
    fn resolve_node_falls_back_to_blob_only_when_owner_suffix_fails() {
        let nodes = vec!["node1".to_string()];
        let mut blob_was_fetched = false;
        let resolved = resolve_node("root@pam!pulse-node1", &nodes, || {
            blob_was_fetched = true;
            None
        });
        assert_eq!(resolved, Some("node1".to_string()));
        assert!(!blob_was_fetched);
    }

    #[test]
    fn detect_collisions_flags_same_backup_id_distinct_nodes() {
        let now = Utc::now();
        let snapshots = vec![
            snapshot("100", Some("node1"), now),
            snapshot("100", Some("node2"), now),
        ];
        let collisions = detect_collisions(&snapshots, now);
        assert_eq!(collisions.len(), 1);
        assert_eq!(collisions[0].nodes, vec!["node1".to_string(), "node2".to_string()]);
        assert_eq!(collisions[0].severity, CollisionSeverity::Critical);
    }

    #[test]
    fn detect_collisions_ignores_same_node_or_unresolved() {
        let now = Utc::now();
        let snapshots = vec![
            snapshot("200", Some("node1"), now),
            snapshot("200", Some("node1"), now),
            snapshot("200", None, now),
        ];
        assert!(detect_collisions(&snapshots, now).is_empty());
    }
}
