//! Local write path used by the app's own screens.
//!
//! Every local mutation goes through here so that edits advance
//! `updated_at` and deletions leave a tombstone behind for peers.

use crate::error::{StorageError, StorageResult};
use crate::store::{EventStore, TombstoneStore};
use babytracker_types::{Event, Timestamp, Tombstone};
use std::sync::Arc;
use tracing::debug;

/// Records, edits and deletes events on behalf of the local user.
pub struct EventRepository<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for EventRepository<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> EventRepository<S>
where
    S: EventStore + TombstoneStore + ?Sized,
{
    /// Wraps a shared store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Persists a new event and returns it with its local id assigned.
    pub fn log(&self, mut event: Event) -> StorageResult<Event> {
        event.local_id = self.store.insert_event(&event)?;
        debug!(sync_id = %event.sync_id, kind = %event.event_type, "logged event");
        Ok(event)
    }

    /// Saves user edits to an existing event.
    ///
    /// The sync id is taken from the stored row, and `updated_at` moves to
    /// the current time but never backwards.
    pub fn edit(&self, mut event: Event) -> StorageResult<Event> {
        let existing = self
            .store
            .event_by_id(event.local_id)?
            .ok_or_else(|| StorageError::NotFound(format!("event {}", event.local_id)))?;

        event.sync_id = existing.sync_id;
        event.updated_at = Timestamp::now().max(existing.updated_at);
        if !self.store.update_event(&event)? {
            return Err(StorageError::NotFound(format!("event {}", event.local_id)));
        }
        debug!(sync_id = %event.sync_id, "edited event");
        Ok(event)
    }

    /// Deletes an event, recording its tombstone first.
    ///
    /// Returns false if the event was already gone.
    pub fn delete(&self, event: &Event) -> StorageResult<bool> {
        self.store.insert_tombstone(&Tombstone::now(event.sync_id.clone()))?;
        let removed = self.store.delete_event(event.local_id)?;
        debug!(sync_id = %event.sync_id, removed, "deleted event");
        Ok(removed)
    }

    /// Every event, newest first.
    pub fn all(&self) -> StorageResult<Vec<Event>> {
        self.store.all_events()
    }
}
