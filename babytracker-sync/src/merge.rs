//! Tombstone-first, last-write-wins merge of a peer's dataset.
//!
//! Both ends of an exchange run the same algorithm. Tombstones are applied
//! before any event so a deletion can never be undone by a stale copy
//! arriving in the same message. For events, the strictly newer
//! `updated_at` wins and ties keep the local row, which makes the merge
//! idempotent and independent of record order.

use crate::config::SyncLimits;
use crate::error::SyncResult;
use crate::protocol::SyncMessage;
use babytracker_storage::SyncStore;
use babytracker_types::{Event, EventType, SubType, Tombstone};
use std::fmt;
use tracing::{debug, warn};

/// What one merge did to the local store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Local events removed by remote tombstones.
    pub deleted: usize,
    /// Remote events inserted locally.
    pub inserted: usize,
    /// Local events overwritten by newer remote versions.
    pub updated: usize,
    /// Remote events rejected by validation.
    pub skipped_invalid: usize,
    /// Remote events whose sync id is tombstoned locally.
    pub skipped_tombstoned: usize,
    /// Remote events already present with an equal or newer local version.
    pub unchanged: usize,
}

impl MergeReport {
    /// Number of local rows mutated.
    pub fn changes(&self) -> usize {
        self.deleted + self.inserted + self.updated
    }
}

impl fmt::Display for MergeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} changes ({} deleted, {} inserted, {} updated, {} invalid, {} tombstoned, {} unchanged)",
            self.changes(),
            self.deleted,
            self.inserted,
            self.updated,
            self.skipped_invalid,
            self.skipped_tombstoned,
            self.unchanged
        )
    }
}

/// Why a remote event was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidEvent {
    UnknownEventType(String),
    UnknownSubType(String),
    MillilitersOutOfRange(i32),
}

impl fmt::Display for InvalidEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownEventType(t) => write!(f, "unknown event type {t:?}"),
            Self::UnknownSubType(t) => write!(f, "unknown sub type {t:?}"),
            Self::MillilitersOutOfRange(ml) => write!(f, "milliliters out of range: {ml}"),
        }
    }
}

/// Checks an incoming event against the known vocabulary and quantity range.
pub fn validate_event(event: &Event, limits: &SyncLimits) -> Result<(), InvalidEvent> {
    if !EventType::is_known(&event.event_type) {
        return Err(InvalidEvent::UnknownEventType(event.event_type.clone()));
    }
    if !SubType::is_known(&event.sub_type) {
        return Err(InvalidEvent::UnknownSubType(event.sub_type.clone()));
    }
    match event.milliliters {
        Some(ml) if !(0..=limits.max_milliliters).contains(&ml) => {
            Err(InvalidEvent::MillilitersOutOfRange(ml))
        }
        _ => Ok(()),
    }
}

/// Truncates an over-long note to `max_chars` characters.
pub fn sanitize_event(mut event: Event, limits: &SyncLimits) -> Event {
    if let Some(note) = event.note.as_mut() {
        if let Some((cut, _)) = note.char_indices().nth(limits.max_note_chars) {
            note.truncate(cut);
        }
    }
    event
}

/// Applies a remote dataset to the local store.
///
/// Record-count limits are the caller's concern and must be checked before
/// calling this. Every store call is atomic on its own; a failure midway
/// leaves earlier mutations in place.
pub fn merge<S>(store: &S, message: &SyncMessage, limits: &SyncLimits) -> SyncResult<MergeReport>
where
    S: SyncStore + ?Sized,
{
    let mut report = MergeReport::default();

    for wire in &message.tombstones {
        let tombstone = Tombstone::from(wire.clone());
        store.insert_tombstone(&tombstone)?;
        if store.delete_event_by_sync_id(&tombstone.sync_id)? {
            debug!(sync_id = %tombstone.sync_id, "deleted tombstoned event");
            report.deleted += 1;
        }
    }

    for wire in &message.events {
        let remote = wire.clone().into_event();

        if let Err(reason) = validate_event(&remote, limits) {
            warn!(sync_id = %remote.sync_id, %reason, "skipping invalid event");
            report.skipped_invalid += 1;
            continue;
        }

        if store.has_tombstone(&remote.sync_id)? {
            report.skipped_tombstoned += 1;
            continue;
        }

        let remote = sanitize_event(remote, limits);

        match store.event_by_sync_id(&remote.sync_id)? {
            None => {
                if store.insert_event_if_absent(&remote)?.is_some() {
                    report.inserted += 1;
                } else {
                    report.unchanged += 1;
                }
            }
            Some(local) if remote.updated_at > local.updated_at => {
                let replacement = Event {
                    local_id: local.local_id,
                    ..remote
                };
                if store.update_event(&replacement)? {
                    report.updated += 1;
                } else {
                    report.unchanged += 1;
                }
            }
            Some(_) => report.unchanged += 1,
        }
    }

    debug!(device = %message.device_id, %report, "merge finished");
    Ok(report)
}
