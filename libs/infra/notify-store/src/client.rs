// [libs/infra/notify-store/src/client.rs]
//! libSQL connection wrapper. An in-memory database is purged the
//! instant its one connection is dropped, so an anchor connection is
//! held alive for the lifetime of the client whenever the URL points at
//! `:memory:`.

use std::sync::Arc;

use libsql::{Builder, Connection, Database};
use tracing::{info, instrument};

use crate::errors::NotifyStoreError;
use crate::schema::apply_schema;

#[derive(Clone)]
pub struct NotifyStoreClient {
    database: Arc<Database>,
    /// Keeps an in-memory database alive; never read after construction.
    _memory_anchor: Option<Arc<Connection>>,
}

impl NotifyStoreClient {
    #[instrument(skip(auth_token))]
    pub async fn connect(database_url: &str, auth_token: Option<String>) -> Result<Self, NotifyStoreError> {
        if database_url.is_empty() {
            return Err(NotifyStoreError::Connection("database url is empty".into()));
        }

        let is_remote = database_url.starts_with("libsql://") || database_url.starts_with("https://");
        let is_memory = database_url.contains(":memory:");

        let database = if is_remote {
            let token = auth_token
                .ok_or_else(|| NotifyStoreError::Connection("remote database requires an auth token".into()))?;
            Builder::new_remote(database_url.to_string(), token).build().await
        } else {
            Builder::new_local(database_url).build().await
        }
        .map_err(|error| NotifyStoreError::Connection(error.to_string()))?;

        let database = Arc::new(database);

        let memory_anchor = if is_memory {
            let anchor = database.connect().map_err(|error| NotifyStoreError::Connection(error.to_string()))?;
            apply_schema(&anchor).await?;
            Some(Arc::new(anchor))
        } else {
            let bootstrap = database.connect().map_err(|error| NotifyStoreError::Connection(error.to_string()))?;
            apply_schema(&bootstrap).await?;
            None
        };

        info!(database_url, "notification store connected");
        Ok(Self { database, _memory_anchor: memory_anchor })
    }

    pub fn get_connection(&self) -> Result<Connection, NotifyStoreError> {
        self.database.connect().map_err(|error| NotifyStoreError::Connection(error.to_string()))
    }
}
