// [libs/core/domain/src/identity.rs]
//! Resource identity.
//!
//! Entities are keyed by the composite `(instanceId, nodeName, localId)`.
//! Two resources from different sources may share a `localId` (VMID/CTID
//! are only unique within one PVE node); the composite key is what keeps
//! them from colliding inside `ClusterState`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId {
    pub instance_id: String,
    pub node_name: String,
    pub local_id: String,
}

impl ResourceId {
    pub fn new(instance_id: impl Into<String>, node_name: impl Into<String>, local_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            node_name: node_name.into(),
            local_id: local_id.into(),
        }
    }

    /// The `"{instance}:{node}:{localId}"` form used for external references.
    pub fn display_id(&self) -> String {
        format!("{}:{}:{}", self.instance_id, self.node_name, self.local_id)
    }

    /// Inverse of [`ResourceId::display_id`]. `None` if `value` doesn't
    /// have exactly three colon-separated parts.
    pub fn parse(value: &str) -> Option<Self> {
        let mut parts = value.splitn(3, ':');
        let instance_id = parts.next()?;
        let node_name = parts.next()?;
        let local_id = parts.next()?;
        Some(Self::new(instance_id, node_name, local_id))
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_instances_with_same_local_id_do_not_collide() {
        let a = ResourceId::new("pve-a", "node1", "100");
        let b = ResourceId::new("pve-b", "node1", "100");
        assert_ne!(a, b);
        assert_ne!(a.display_id(), b.display_id());
    }

    #[test]
    fn display_id_matches_external_reference_format() {
        let id = ResourceId::new("pve-a", "node1", "100");
        assert_eq!(id.display_id(), "pve-a:node1:100");
    }

    #[test]
    fn parse_is_the_inverse_of_display_id() {
        let id = ResourceId::new("pve-a", "node1", "100");
        assert_eq!(ResourceId::parse(&id.display_id()), Some(id));
    }

    #[test]
    fn parse_rejects_malformed_input() {
        assert_eq!(ResourceId::parse("not-enough-parts"), None);
    }
}
