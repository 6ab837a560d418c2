// [libs/core/domain/src/source.rs]
//! A configured monitoring target.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Pve,
    Pbs,
}

/// How credentials for a source are supplied. The credential material
/// itself is treated as opaque by this crate; `pulse-secure-config` is
/// the only place it is ever decrypted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuthKind {
    ApiToken { token_id: String, secret: String },
    Password { username: String, password: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TlsPolicy {
    Verify,
    SkipVerify,
}

impl Default for TlsPolicy {
    fn default() -> Self {
        TlsPolicy::Verify
    }
}

/// A configured PVE or PBS endpoint. Created and deleted through the
/// config API; never mutated in place except by config writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub kind: SourceKind,
    pub name: String,
    pub endpoint: String,
    pub auth: AuthKind,
    pub tls_policy: TlsPolicy,
    /// Overrides the scheduler's default cadence for this source only.
    pub poll_interval_override: Option<std::time::Duration>,
}

impl Source {
    pub fn poll_interval(&self, default_pve: std::time::Duration, default_pbs: std::time::Duration) -> std::time::Duration {
        self.poll_interval_override.unwrap_or(match self.kind {
            SourceKind::Pve => default_pve,
            SourceKind::Pbs => default_pbs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_interval_falls_back_to_kind_default() {
        let source = Source {
            id: "pve-1".into(),
            kind: SourceKind::Pve,
            name: "dc1".into(),
            endpoint: "https://pve.example:8006".into(),
            auth: AuthKind::ApiToken { token_id: "root@pam!pulse".into(), secret: "x".into() },
            tls_policy: TlsPolicy::Verify,
            poll_interval_override: None,
        };
        assert_eq!(
            source.poll_interval(std::time::Duration::from_secs(10), std::time::Duration::from_secs(30)),
            std::time::Duration::from_secs(10)
        );
    }

    #[test]
    fn poll_interval_override_wins() {
        let mut source = Source {
            id: "pbs-1".into(),
            kind: SourceKind::Pbs,
            name: "backup1".into(),
            endpoint: "https://pbs.example:8007".into(),
            auth: AuthKind::Password { username: "root@pam".into(), password: "x".into() },
            tls_policy: TlsPolicy::SkipVerify,
            poll_interval_override: Some(std::time::Duration::from_secs(5)),
        };
        assert_eq!(
            source.poll_interval(std::time::Duration::from_secs(10), std::time::Duration::from_secs(30)),
            std::time::Duration::from_secs(5)
        );
        source.poll_interval_override = None;
        assert_eq!(
            source.poll_interval(std::time::Duration::from_secs(10), std::time::Duration::from_secs(30)),
            std::time::Duration::from_secs(30)
        );
    }
}
