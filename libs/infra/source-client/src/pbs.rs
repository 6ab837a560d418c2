// [libs/infra/source-client/src/pbs.rs]
//! PBS wire client: datastores, snapshots, groups,
//! datastore usage.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use pulse_domain::source::Source;
use serde::Deserialize;

use crate::errors::SourceClientError;
use crate::rate_limit::TokenBucket;
use crate::retry::retry_with_backoff;
use crate::transport::SharedTransport;

#[derive(Debug, Clone, Deserialize)]
pub struct DatastoreSnapshot {
    pub store: String,
    #[serde(default)]
    pub used: u64,
    #[serde(default)]
    pub total: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackupGroupSnapshot {
    pub store: String,
    #[serde(default = "default_namespace")]
    pub ns: String,
    #[serde(rename = "backup-type")]
    pub backup_type: String,
    #[serde(rename = "backup-id")]
    pub backup_id: String,
    #[serde(rename = "backup-time")]
    pub backup_time: DateTime<Utc>,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub protected: bool,
}

fn default_namespace() -> String {
    "root".to_string()
}

#[derive(Debug, Clone, Default)]
pub struct PbsSnapshot {
    pub datastores: Vec<DatastoreSnapshot>,
    pub backups: Vec<BackupGroupSnapshot>,
}

#[derive(Deserialize)]
struct ApiEnvelope<T> {
    data: T,
}

pub struct PbsClient {
    source: Source,
    transport: Arc<SharedTransport>,
    rate_limiter: TokenBucket,
}

impl PbsClient {
    pub fn new(source: Source, transport: Arc<SharedTransport>) -> Self {
        Self { source, transport, rate_limiter: TokenBucket::new(10.0, 5.0) }
    }

    pub async fn snapshot(&self) -> Result<PbsSnapshot, SourceClientError> {
        let datastores: Vec<DatastoreSnapshot> =
            retry_with_backoff(|| self.get_json("/api2/json/status/datastore-usage")).await?;

        let mut backups = Vec::new();
        for datastore in &datastores {
            let path = format!("/api2/json/admin/datastore/{}/snapshots", datastore.store);
            match retry_with_backoff(|| self.get_json::<Vec<BackupGroupSnapshot>>(&path)).await {
                Ok(mut found) => backups.append(&mut found),
                Err(error) => {
                    tracing::warn!(datastore = %datastore.store, %error, "skipping datastore with unreadable snapshot list");
                }
            }
        }

        Ok(PbsSnapshot { datastores, backups })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, SourceClientError> {
        self.rate_limiter.acquire().await;

        let url = format!("{}{}", self.source.endpoint.trim_end_matches('/'), path);
        let client = self.transport.client_for(self.source.tls_policy);

        let response = client.get(&url).header("Authorization", auth_header(&self.source.auth)).send().await?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED || response.status() == reqwest::StatusCode::FORBIDDEN {
            return Err(SourceClientError::Auth(format!("HTTP {}", response.status())));
        }
        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(SourceClientError::RateLimited { retry_after_secs: None });
        }
        if !response.status().is_success() {
            return Err(SourceClientError::Unreachable(format!("HTTP {}", response.status())));
        }

        let envelope: ApiEnvelope<T> = response.json().await.map_err(|error| SourceClientError::Protocol(error.to_string()))?;
        Ok(envelope.data)
    }
}

fn auth_header(auth: &pulse_domain::source::AuthKind) -> String {
    match auth {
        pulse_domain::source::AuthKind::ApiToken { token_id, secret } => format!("PBSAPIToken={token_id}={secret}"),
        pulse_domain::source::AuthKind::Password { .. } => String::new(),
    }
}
