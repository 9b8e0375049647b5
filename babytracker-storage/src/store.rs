//! Store contracts consumed by the sync engine.
//!
//! Every method is a single atomic operation. The merge engine relies on
//! that per-operation atomicity and does no locking of its own, so
//! implementations must serialize conflicting writes internally.

use crate::error::StorageResult;
use babytracker_types::{DeviceId, Event, SyncId, Tombstone, TrustedPeer};

/// Durable log of domain events keyed by sync id.
pub trait EventStore: Send + Sync {
    /// Every stored event, newest occurrence first.
    fn all_events(&self) -> StorageResult<Vec<Event>>;

    /// Looks up an event by its cross-device sync id.
    fn event_by_sync_id(&self, sync_id: &SyncId) -> StorageResult<Option<Event>>;

    /// Looks up an event by its storage-local id.
    fn event_by_id(&self, local_id: i64) -> StorageResult<Option<Event>>;

    /// Inserts an event, ignoring `event.local_id`, and returns the
    /// newly assigned local id. Fails if the sync id already exists.
    fn insert_event(&self, event: &Event) -> StorageResult<i64>;

    /// Inserts an event unless its sync id already exists.
    /// Returns `None` on conflict.
    fn insert_event_if_absent(&self, event: &Event) -> StorageResult<Option<i64>>;

    /// Overwrites the row with `event.local_id`. Returns false if no such row.
    fn update_event(&self, event: &Event) -> StorageResult<bool>;

    /// Deletes by local id. Returns true if a row was removed.
    fn delete_event(&self, local_id: i64) -> StorageResult<bool>;

    /// Deletes by sync id. Returns true if a row was removed.
    fn delete_event_by_sync_id(&self, sync_id: &SyncId) -> StorageResult<bool>;
}

/// Durable set of deletion markers.
pub trait TombstoneStore: Send + Sync {
    /// Every tombstone.
    fn all_tombstones(&self) -> StorageResult<Vec<Tombstone>>;

    /// Inserts unless one exists for the same sync id; an existing
    /// tombstone is never touched. Returns true if inserted.
    fn insert_tombstone(&self, tombstone: &Tombstone) -> StorageResult<bool>;

    /// Returns true if the sync id has been deleted.
    fn has_tombstone(&self, sync_id: &SyncId) -> StorageResult<bool>;
}

/// Persistent allow-list of remote devices.
pub trait TrustedPeerStore: Send + Sync {
    /// Returns true if the device was permanently approved.
    fn is_trusted(&self, device_id: &DeviceId) -> StorageResult<bool>;

    /// Stores a trusted peer, replacing any row with the same device id.
    fn save_trusted_peer(&self, peer: &TrustedPeer) -> StorageResult<()>;

    /// Removes a trusted peer. Returns true if a row was removed.
    fn remove_trusted_peer(&self, device_id: &DeviceId) -> StorageResult<bool>;

    /// Every trusted peer, most recently approved first.
    fn trusted_peers(&self) -> StorageResult<Vec<TrustedPeer>>;
}

const KEY_DEVICE_ID: &str = "device_id";
const KEY_DEVICE_NAME: &str = "device_name";
const KEY_BABY_NAME: &str = "baby_name";

/// Small key-value preference store.
///
/// Only the three raw accessors are required; the typed accessors used
/// by the sync engine are provided on top of them.
pub trait Preferences: Send + Sync {
    /// Reads a preference.
    fn get_preference(&self, key: &str) -> StorageResult<Option<String>>;

    /// Writes a preference, replacing any previous value.
    fn set_preference(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Writes a preference only if the key is unset.
    /// Returns true if the value was written.
    fn set_preference_if_absent(&self, key: &str, value: &str) -> StorageResult<bool>;

    /// This install's device id, generated and persisted on first use.
    fn device_id(&self) -> StorageResult<DeviceId> {
        if let Some(existing) = self.get_preference(KEY_DEVICE_ID)? {
            return Ok(DeviceId::from(existing));
        }
        let fresh = DeviceId::new();
        self.set_preference_if_absent(KEY_DEVICE_ID, fresh.as_str())?;
        // Re-read so concurrent first calls agree on the winner.
        Ok(self
            .get_preference(KEY_DEVICE_ID)?
            .map(DeviceId::from)
            .unwrap_or(fresh))
    }

    /// The locally configured display name, if any.
    fn device_name(&self) -> StorageResult<Option<String>> {
        self.get_preference(KEY_DEVICE_NAME)
    }

    /// Sets the local display name.
    fn set_device_name(&self, name: &str) -> StorageResult<()> {
        self.set_preference(KEY_DEVICE_NAME, name)
    }

    /// The shared display label, empty when unset.
    fn baby_name(&self) -> StorageResult<String> {
        Ok(self.get_preference(KEY_BABY_NAME)?.unwrap_or_default())
    }

    /// Sets the shared display label.
    fn set_baby_name(&self, name: &str) -> StorageResult<()> {
        self.set_preference(KEY_BABY_NAME, name)
    }
}

/// Everything the sync engine needs from its host's storage.
pub trait SyncStore: EventStore + TombstoneStore + TrustedPeerStore + Preferences {}

impl<T> SyncStore for T where T: EventStore + TombstoneStore + TrustedPeerStore + Preferences {}
