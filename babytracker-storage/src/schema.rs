//! Database schema.

use crate::error::{StorageError, StorageResult};
use rusqlite::Connection;
use tracing::debug;

/// Current schema version, stored in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i32 = 4;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS baby_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        sync_id TEXT NOT NULL,
        event_type TEXT NOT NULL,
        sub_type TEXT NOT NULL,
        timestamp INTEGER NOT NULL,
        milliliters INTEGER,
        note TEXT,
        updated_at INTEGER NOT NULL
    );

    CREATE UNIQUE INDEX IF NOT EXISTS index_baby_events_sync_id
        ON baby_events(sync_id);

    CREATE TABLE IF NOT EXISTS sync_tombstones (
        sync_id TEXT NOT NULL PRIMARY KEY,
        deleted_at INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS trusted_devices (
        device_id TEXT NOT NULL PRIMARY KEY,
        device_name TEXT NOT NULL DEFAULT '',
        added_at INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS preferences (
        key TEXT NOT NULL PRIMARY KEY,
        value TEXT NOT NULL
    );
";

/// Creates any missing tables and records the schema version.
pub fn init_schema(conn: &Connection) -> StorageResult<()> {
    let version: i32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(|e| StorageError::Migration(format!("failed to read schema version: {e}")))?;

    if version > SCHEMA_VERSION {
        return Err(StorageError::Migration(format!(
            "database schema {version} is newer than supported {SCHEMA_VERSION}"
        )));
    }

    conn.execute_batch(SCHEMA)
        .map_err(|e| StorageError::Migration(format!("failed to init schema: {e}")))?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)
        .map_err(|e| StorageError::Migration(format!("failed to set schema version: {e}")))?;

    debug!(from = version, to = SCHEMA_VERSION, "schema ready");
    Ok(())
}
