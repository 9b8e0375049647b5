//! SQLite-backed implementation of every store contract.
//!
//! One connection is shared behind a mutex, which serializes the listener
//! and connector paths when both merge at the same moment.

use crate::error::{StorageError, StorageResult};
use crate::schema::init_schema;
use crate::store::{EventStore, Preferences, TombstoneStore, TrustedPeerStore};
use babytracker_types::{DeviceId, Event, SyncId, Timestamp, Tombstone, TrustedPeer};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

const EVENT_COLUMNS: &str =
    "id, sync_id, event_type, sub_type, timestamp, updated_at, milliliters, note";

/// Persistent store backed by a single SQLite database file.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Opens (or creates) a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        let store = Self::from_connection(conn)?;
        info!(path = %path.display(), "opened sync store");
        Ok(store)
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StorageResult<Self> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StorageError::Lock(e.to_string()))
    }

    /// Number of stored events.
    pub fn event_count(&self) -> StorageResult<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM baby_events", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

fn row_to_event(row: &Row<'_>) -> rusqlite::Result<Event> {
    Ok(Event {
        local_id: row.get(0)?,
        sync_id: SyncId::from(row.get::<_, String>(1)?),
        event_type: row.get(2)?,
        sub_type: row.get(3)?,
        timestamp: Timestamp::from_millis(row.get(4)?),
        updated_at: Timestamp::from_millis(row.get(5)?),
        milliliters: row.get(6)?,
        note: row.get(7)?,
    })
}

fn row_to_tombstone(row: &Row<'_>) -> rusqlite::Result<Tombstone> {
    Ok(Tombstone {
        sync_id: SyncId::from(row.get::<_, String>(0)?),
        deleted_at: Timestamp::from_millis(row.get(1)?),
    })
}

fn row_to_trusted_peer(row: &Row<'_>) -> rusqlite::Result<TrustedPeer> {
    Ok(TrustedPeer {
        device_id: DeviceId::from(row.get::<_, String>(0)?),
        display_name: row.get(1)?,
        added_at: Timestamp::from_millis(row.get(2)?),
    })
}

impl EventStore for SqliteStore {
    fn all_events(&self) -> StorageResult<Vec<Event>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM baby_events ORDER BY timestamp DESC, id DESC"
        ))?;
        let events = stmt
            .query_map([], row_to_event)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    fn event_by_sync_id(&self, sync_id: &SyncId) -> StorageResult<Option<Event>> {
        let conn = self.conn()?;
        let event = conn
            .query_row(
                &format!("SELECT {EVENT_COLUMNS} FROM baby_events WHERE sync_id = ?1"),
                params![sync_id.as_str()],
                row_to_event,
            )
            .optional()?;
        Ok(event)
    }

    fn event_by_id(&self, local_id: i64) -> StorageResult<Option<Event>> {
        let conn = self.conn()?;
        let event = conn
            .query_row(
                &format!("SELECT {EVENT_COLUMNS} FROM baby_events WHERE id = ?1"),
                params![local_id],
                row_to_event,
            )
            .optional()?;
        Ok(event)
    }

    fn insert_event(&self, event: &Event) -> StorageResult<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO baby_events (sync_id, event_type, sub_type, timestamp, updated_at, milliliters, note)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                event.sync_id.as_str(),
                event.event_type,
                event.sub_type,
                event.timestamp.as_millis(),
                event.updated_at.as_millis(),
                event.milliliters,
                event.note,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn insert_event_if_absent(&self, event: &Event) -> StorageResult<Option<i64>> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO baby_events (sync_id, event_type, sub_type, timestamp, updated_at, milliliters, note)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                event.sync_id.as_str(),
                event.event_type,
                event.sub_type,
                event.timestamp.as_millis(),
                event.updated_at.as_millis(),
                event.milliliters,
                event.note,
            ],
        )?;
        if inserted == 0 {
            return Ok(None);
        }
        Ok(Some(conn.last_insert_rowid()))
    }

    fn update_event(&self, event: &Event) -> StorageResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE baby_events
             SET sync_id = ?1, event_type = ?2, sub_type = ?3, timestamp = ?4,
                 updated_at = ?5, milliliters = ?6, note = ?7
             WHERE id = ?8",
            params![
                event.sync_id.as_str(),
                event.event_type,
                event.sub_type,
                event.timestamp.as_millis(),
                event.updated_at.as_millis(),
                event.milliliters,
                event.note,
                event.local_id,
            ],
        )?;
        Ok(changed > 0)
    }

    fn delete_event(&self, local_id: i64) -> StorageResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM baby_events WHERE id = ?1", params![local_id])?;
        Ok(changed > 0)
    }

    fn delete_event_by_sync_id(&self, sync_id: &SyncId) -> StorageResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "DELETE FROM baby_events WHERE sync_id = ?1",
            params![sync_id.as_str()],
        )?;
        Ok(changed > 0)
    }
}

impl TombstoneStore for SqliteStore {
    fn all_tombstones(&self) -> StorageResult<Vec<Tombstone>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT sync_id, deleted_at FROM sync_tombstones")?;
        let tombstones = stmt
            .query_map([], row_to_tombstone)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tombstones)
    }

    fn insert_tombstone(&self, tombstone: &Tombstone) -> StorageResult<bool> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO sync_tombstones (sync_id, deleted_at) VALUES (?1, ?2)",
            params![tombstone.sync_id.as_str(), tombstone.deleted_at.as_millis()],
        )?;
        Ok(inserted > 0)
    }

    fn has_tombstone(&self, sync_id: &SyncId) -> StorageResult<bool> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sync_tombstones WHERE sync_id = ?1",
            params![sync_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

impl TrustedPeerStore for SqliteStore {
    fn is_trusted(&self, device_id: &DeviceId) -> StorageResult<bool> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM trusted_devices WHERE device_id = ?1",
            params![device_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn save_trusted_peer(&self, peer: &TrustedPeer) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO trusted_devices (device_id, device_name, added_at) VALUES (?1, ?2, ?3)",
            params![
                peer.device_id.as_str(),
                peer.display_name,
                peer.added_at.as_millis()
            ],
        )?;
        Ok(())
    }

    fn remove_trusted_peer(&self, device_id: &DeviceId) -> StorageResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "DELETE FROM trusted_devices WHERE device_id = ?1",
            params![device_id.as_str()],
        )?;
        Ok(changed > 0)
    }

    fn trusted_peers(&self) -> StorageResult<Vec<TrustedPeer>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT device_id, device_name, added_at FROM trusted_devices ORDER BY added_at DESC",
        )?;
        let peers = stmt
            .query_map([], row_to_trusted_peer)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(peers)
    }
}

impl Preferences for SqliteStore {
    fn get_preference(&self, key: &str) -> StorageResult<Option<String>> {
        let conn = self.conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM preferences WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_preference(&self, key: &str, value: &str) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO preferences (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    fn set_preference_if_absent(&self, key: &str, value: &str) -> StorageResult<bool> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO preferences (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(inserted > 0)
    }
}
