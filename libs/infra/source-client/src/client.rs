// [libs/infra/source-client/src/client.rs]
//! The uniform `SourceClient` contract: `Snapshot(ctx) -> PVESnapshot
//! | PBSSnapshot | error`.

use async_trait::async_trait;

use crate::errors::SourceClientError;
use crate::pbs::{PbsClient, PbsSnapshot};
use crate::pve::{PveClient, PveSnapshot};

#[derive(Debug, Clone)]
pub enum Snapshot {
    Pve(PveSnapshot),
    Pbs(PbsSnapshot),
}

#[async_trait]
pub trait SourceClient: Send + Sync {
    async fn snapshot(&self) -> Result<Snapshot, SourceClientError>;
}

#[async_trait]
impl SourceClient for PveClient {
    async fn snapshot(&self) -> Result<Snapshot, SourceClientError> {
        Ok(Snapshot::Pve(PveClient::snapshot(self).await?))
    }
}

#[async_trait]
impl SourceClient for PbsClient {
    async fn snapshot(&self) -> Result<Snapshot, SourceClientError> {
        Ok(Snapshot::Pbs(PbsClient::snapshot(self).await?))
    }
}
