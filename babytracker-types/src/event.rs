//! Logged events, their closed vocabulary, and deletion tombstones.
//!
//! Events keep their classification as plain strings. A peer running a
//! newer schema may send values this build does not know; those must be
//! representable long enough to be rejected by the merge validator rather
//! than failing the whole message at decode time.

use crate::{Error, SyncId, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Top-level classification of a logged event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Feeding,
    Diaper,
    SpitUp,
}

impl EventType {
    /// Every known event type.
    pub const ALL: [EventType; 3] = [EventType::Feeding, EventType::Diaper, EventType::SpitUp];

    /// Wire/storage name of this type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Feeding => "FEEDING",
            Self::Diaper => "DIAPER",
            Self::SpitUp => "SPIT_UP",
        }
    }

    /// Returns true if `name` is a known event type.
    #[must_use]
    pub fn is_known(name: &str) -> bool {
        Self::from_str(name).is_ok()
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::UnknownEventType(s.to_string()))
    }
}

/// Sub classification, the union of every category's options.
///
/// Spit-up events have no options of their own and reuse their type
/// name as sub type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubType {
    Bottle,
    BreastLeft,
    BreastRight,
    #[serde(rename = "BREAST_BOTH_LR")]
    BreastBothLr,
    #[serde(rename = "BREAST_BOTH_RL")]
    BreastBothRl,
    Pump,
    PumpLeft,
    PumpRight,
    #[serde(rename = "PUMP_BOTH_LR")]
    PumpBothLr,
    #[serde(rename = "PUMP_BOTH_RL")]
    PumpBothRl,
    /// Legacy breastfeeding entry kept for old records.
    Natural,
    Pee,
    Poop,
    Mixed,
    SpitUp,
}

impl SubType {
    /// Every known sub type.
    pub const ALL: [SubType; 15] = [
        SubType::Bottle,
        SubType::BreastLeft,
        SubType::BreastRight,
        SubType::BreastBothLr,
        SubType::BreastBothRl,
        SubType::Pump,
        SubType::PumpLeft,
        SubType::PumpRight,
        SubType::PumpBothLr,
        SubType::PumpBothRl,
        SubType::Natural,
        SubType::Pee,
        SubType::Poop,
        SubType::Mixed,
        SubType::SpitUp,
    ];

    /// Wire/storage name of this sub type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Bottle => "BOTTLE",
            Self::BreastLeft => "BREAST_LEFT",
            Self::BreastRight => "BREAST_RIGHT",
            Self::BreastBothLr => "BREAST_BOTH_LR",
            Self::BreastBothRl => "BREAST_BOTH_RL",
            Self::Pump => "PUMP",
            Self::PumpLeft => "PUMP_LEFT",
            Self::PumpRight => "PUMP_RIGHT",
            Self::PumpBothLr => "PUMP_BOTH_LR",
            Self::PumpBothRl => "PUMP_BOTH_RL",
            Self::Natural => "NATURAL",
            Self::Pee => "PEE",
            Self::Poop => "POOP",
            Self::Mixed => "MIXED",
            Self::SpitUp => "SPIT_UP",
        }
    }

    /// The event type this sub type is normally logged under.
    #[must_use]
    pub const fn category(&self) -> EventType {
        match self {
            Self::Pee | Self::Poop | Self::Mixed => EventType::Diaper,
            Self::SpitUp => EventType::SpitUp,
            _ => EventType::Feeding,
        }
    }

    /// Returns true if `name` is a known sub type of any category.
    #[must_use]
    pub fn is_known(name: &str) -> bool {
        Self::from_str(name).is_ok()
    }
}

impl fmt::Display for SubType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::UnknownSubType(s.to_string()))
    }
}

/// A single logged occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Storage-local row id; `0` until the event is persisted.
    /// Meaningless on any other device.
    #[serde(default)]
    pub local_id: i64,
    /// Cross-device merge key.
    pub sync_id: SyncId,
    /// Event type name (see [`EventType`]).
    pub event_type: String,
    /// Sub type name (see [`SubType`]).
    pub sub_type: String,
    /// When the occurrence happened. User-editable.
    pub timestamp: Timestamp,
    /// Last modification time, compared during merge.
    pub updated_at: Timestamp,
    /// Quantity in millilitres, for bottle and pump feedings.
    pub milliliters: Option<i32>,
    /// Free-text note.
    pub note: Option<String>,
}

impl Event {
    /// Creates a new, not yet persisted event happening now.
    #[must_use]
    pub fn new(event_type: EventType, sub_type: SubType) -> Self {
        let now = Timestamp::now();
        Self {
            local_id: 0,
            sync_id: SyncId::new(),
            event_type: event_type.as_str().to_string(),
            sub_type: sub_type.as_str().to_string(),
            timestamp: now,
            updated_at: now,
            milliliters: None,
            note: None,
        }
    }

    /// Creates a feeding event.
    #[must_use]
    pub fn feeding(sub_type: SubType, milliliters: Option<i32>) -> Self {
        Self::new(EventType::Feeding, sub_type).with_milliliters(milliliters)
    }

    /// Creates a diaper event.
    #[must_use]
    pub fn diaper(sub_type: SubType) -> Self {
        Self::new(EventType::Diaper, sub_type)
    }

    /// Creates a spit-up event.
    #[must_use]
    pub fn spit_up() -> Self {
        Self::new(EventType::SpitUp, SubType::SpitUp)
    }

    /// Sets the quantity.
    #[must_use]
    pub fn with_milliliters(mut self, milliliters: Option<i32>) -> Self {
        self.milliliters = milliliters;
        self
    }

    /// Sets the note.
    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Sets both the occurrence and modification time.
    #[must_use]
    pub fn at(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self.updated_at = timestamp;
        self
    }

    /// Sets the modification time only.
    #[must_use]
    pub fn updated(mut self, updated_at: Timestamp) -> Self {
        self.updated_at = updated_at;
        self
    }

    /// Parsed event type, if known.
    #[must_use]
    pub fn kind(&self) -> Option<EventType> {
        self.event_type.parse().ok()
    }

    /// Parsed sub type, if known.
    #[must_use]
    pub fn sub_kind(&self) -> Option<SubType> {
        self.sub_type.parse().ok()
    }

    /// Compares everything except the storage-local id.
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        self.sync_id == other.sync_id
            && self.event_type == other.event_type
            && self.sub_type == other.sub_type
            && self.timestamp == other.timestamp
            && self.updated_at == other.updated_at
            && self.milliliters == other.milliliters
            && self.note == other.note
    }
}

/// Permanent record that an event was deleted.
///
/// At most one tombstone exists per sync id. Once present, the sync id
/// can never be brought back by a merge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tombstone {
    /// The deleted event's sync id.
    pub sync_id: SyncId,
    /// When the deletion happened on the deleting device.
    pub deleted_at: Timestamp,
}

impl Tombstone {
    /// Creates a tombstone.
    #[must_use]
    pub fn new(sync_id: SyncId, deleted_at: Timestamp) -> Self {
        Self { sync_id, deleted_at }
    }

    /// Creates a tombstone stamped with the current time.
    #[must_use]
    pub fn now(sync_id: SyncId) -> Self {
        Self::new(sync_id, Timestamp::now())
    }
}
