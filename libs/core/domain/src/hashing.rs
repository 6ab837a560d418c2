// [libs/core/domain/src/hashing.rs]
//! Stable content hashing used for diffing entities between merges and for
//! deriving alert ids from `(resourceId, metric)`.

use sha2::{Digest, Sha256};

/// Hashes a serializable value's canonical JSON representation. Used both
/// for change detection and for deterministic alert ids.
///
/// Returns a lowercase hex digest. `serde_json::to_vec` preserves struct
/// field order as declared, which is sufficient for content hashing as
/// long as a type's field order never changes independently of its
/// semantics — true for every type in this crate.
pub fn content_hash<T: serde::Serialize>(value: &T) -> String {
    let bytes = serde_json::to_vec(value).expect("domain types are always serializable");
    let digest = Sha256::digest(bytes);
    hex::encode(digest)
}

/// Derives a stable alert id from a resource id and metric name so the
/// same (resource, metric) pair always maps to the same alert id across
/// restarts.
pub fn alert_id(resource_id: &str, metric: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(resource_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(metric.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_deterministic() {
        let a = vec![1, 2, 3];
        let b = vec![1, 2, 3];
        assert_eq!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn content_hash_differs_on_change() {
        assert_ne!(content_hash(&vec![1, 2, 3]), content_hash(&vec![1, 2, 4]));
    }

    #[test]
    fn alert_id_is_stable_and_scoped_to_metric() {
        let a = alert_id("pve-a:node1:100", "cpu");
        let b = alert_id("pve-a:node1:100", "cpu");
        let c = alert_id("pve-a:node1:100", "mem");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
