// [libs/infra/notify-store/src/schema.rs]
//! Schema bootstrap and idempotent migration: base tables, then
//! additive columns, then indexes, staged so repeated boots against an
//! existing database never fail.

use libsql::Connection;
use tracing::{debug, info, instrument, warn};

use crate::errors::NotifyStoreError;

const BASE_TABLES: &[(&str, &str)] = &[(
    "notifications",
    r#"
        CREATE TABLE IF NOT EXISTS notifications (
            id TEXT PRIMARY KEY,
            notification_type TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            payload TEXT NOT NULL,
            attempts INTEGER NOT NULL DEFAULT 0,
            max_attempts INTEGER NOT NULL DEFAULT 5,
            last_attempt_at TEXT,
            last_error TEXT,
            created_at TEXT NOT NULL,
            next_retry_at TEXT NOT NULL,
            completed_at TEXT
        );
    "#,
)];

/// Columns added after the initial release. `ALTER TABLE ... ADD COLUMN`
/// fails with "duplicate column name" on a database that already has it;
/// that failure is expected and logged at debug, not propagated.
const ADDITIVE_COLUMNS: &[(&str, &str)] = &[];

const INDEXES: &[(&str, &str)] = &[
    (
        "idx_notifications_dispatch",
        "CREATE INDEX IF NOT EXISTS idx_notifications_dispatch ON notifications(status, next_retry_at);",
    ),
    (
        "idx_notifications_created",
        "CREATE INDEX IF NOT EXISTS idx_notifications_created ON notifications(created_at);",
    ),
];

#[instrument(skip(connection))]
pub async fn apply_schema(connection: &Connection) -> Result<(), NotifyStoreError> {
    for (name, sql) in BASE_TABLES {
        debug!(table = name, "creating base table");
        connection.execute(sql, ()).await?;
    }

    for (name, sql) in ADDITIVE_COLUMNS {
        match connection.execute(sql, ()).await {
            Ok(_) => info!(migration = name, "applied additive column"),
            Err(error) => {
                if error.to_string().contains("duplicate column name") {
                    debug!(migration = name, "already applied, skipping");
                } else {
                    warn!(migration = name, %error, "additive migration failed");
                }
            }
        }
    }

    for (name, sql) in INDEXES {
        debug!(index = name, "creating index");
        connection.execute(sql, ()).await?;
    }

    info!("notification store schema is up to date");
    Ok(())
}
