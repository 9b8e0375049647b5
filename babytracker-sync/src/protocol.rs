//! Wire messages exchanged between peers.
//!
//! A connection carries exactly one request line and at most one response
//! line, both JSON. The request is always a full [`SyncMessage`]; the
//! response is either the listener's post-merge [`SyncMessage`] or a
//! [`Rejection`] when the requester is not trusted yet.
//!
//! Field names are camelCase. Optional strings are omitted when empty so
//! older peers that predate a field keep decoding our messages.

use crate::config::SyncLimits;
use crate::error::{SyncError, SyncResult};
use babytracker_types::{DeviceId, Event, SyncId, Timestamp, Tombstone};
use serde::{Deserialize, Serialize};

/// Rejection reason sent when the requester must be approved first.
pub const REASON_APPROVAL_REQUIRED: &str = "approval_required";

/// Full dataset of one device, built fresh for every exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMessage {
    /// Sender's stable device id.
    pub device_id: DeviceId,
    /// Sender's display name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub device_name: String,
    /// Shared display label for the tracked child.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub baby_name: String,
    /// Every event the sender holds.
    pub events: Vec<WireEvent>,
    /// Every tombstone the sender holds.
    #[serde(default)]
    pub tombstones: Vec<WireTombstone>,
}

impl SyncMessage {
    /// Builds a message from a store snapshot.
    pub fn snapshot(
        device_id: DeviceId,
        device_name: impl Into<String>,
        baby_name: impl Into<String>,
        events: &[Event],
        tombstones: &[Tombstone],
    ) -> Self {
        Self {
            device_id,
            device_name: device_name.into(),
            baby_name: baby_name.into(),
            events: events.iter().map(WireEvent::from).collect(),
            tombstones: tombstones.iter().map(WireTombstone::from).collect(),
        }
    }

    /// Fails if the message carries more records than allowed.
    pub fn check_limits(&self, limits: &SyncLimits) -> SyncResult<()> {
        if self.events.len() > limits.max_events {
            return Err(SyncError::LimitExceeded {
                what: "events",
                count: self.events.len(),
                limit: limits.max_events,
            });
        }
        if self.tombstones.len() > limits.max_tombstones {
            return Err(SyncError::LimitExceeded {
                what: "tombstones",
                count: self.tombstones.len(),
                limit: limits.max_tombstones,
            });
        }
        Ok(())
    }

    /// Decodes a request line.
    pub fn from_line(line: &str) -> SyncResult<Self> {
        Ok(serde_json::from_str(line)?)
    }
}

/// One event on the wire. Carries no storage-local id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireEvent {
    pub sync_id: SyncId,
    pub event_type: String,
    pub sub_type: String,
    pub timestamp: Timestamp,
    /// Absent from peers that predate edit tracking.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub milliliters: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl WireEvent {
    /// Modification time, falling back to the occurrence time.
    pub fn updated_at(&self) -> Timestamp {
        self.updated_at.unwrap_or(self.timestamp)
    }

    /// Converts into an unpersisted local event.
    pub fn into_event(self) -> Event {
        let updated_at = self.updated_at();
        Event {
            local_id: 0,
            sync_id: self.sync_id,
            event_type: self.event_type,
            sub_type: self.sub_type,
            timestamp: self.timestamp,
            updated_at,
            milliliters: self.milliliters,
            note: self.note,
        }
    }
}

impl From<&Event> for WireEvent {
    fn from(event: &Event) -> Self {
        Self {
            sync_id: event.sync_id.clone(),
            event_type: event.event_type.clone(),
            sub_type: event.sub_type.clone(),
            timestamp: event.timestamp,
            updated_at: Some(event.updated_at),
            milliliters: event.milliliters,
            note: event.note.clone(),
        }
    }
}

/// One deletion marker on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireTombstone {
    pub sync_id: SyncId,
    pub deleted_at: Timestamp,
}

impl From<&Tombstone> for WireTombstone {
    fn from(tombstone: &Tombstone) -> Self {
        Self {
            sync_id: tombstone.sync_id.clone(),
            deleted_at: tombstone.deleted_at,
        }
    }
}

impl From<WireTombstone> for Tombstone {
    fn from(wire: WireTombstone) -> Self {
        Tombstone::new(wire.sync_id, wire.deleted_at)
    }
}

/// Listener's answer to an untrusted requester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rejection {
    pub approved: bool,
    #[serde(default)]
    pub reason: String,
    /// Listener's display name, so the requester can tell the user which
    /// device to approve on.
    #[serde(default)]
    pub device_name: String,
}

impl Rejection {
    /// The rejection sent to unknown devices.
    pub fn approval_required(device_name: impl Into<String>) -> Self {
        Self {
            approved: false,
            reason: REASON_APPROVAL_REQUIRED.to_string(),
            device_name: device_name.into(),
        }
    }

    /// Returns true if the listener is waiting for a local user decision.
    pub fn is_approval_required(&self) -> bool {
        !self.approved && self.reason == REASON_APPROVAL_REQUIRED
    }
}

/// A decoded response line.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// The listener merged our data and mirrored its own.
    Data(SyncMessage),
    /// The listener wants its user to approve us first.
    ApprovalRequired(Rejection),
}

impl Response {
    /// Decodes a response line, recognising the approval rejection first.
    pub fn from_line(line: &str) -> SyncResult<Self> {
        let value: serde_json::Value = serde_json::from_str(line)?;
        if value.get("approved").and_then(serde_json::Value::as_bool) == Some(false) {
            let rejection: Rejection = serde_json::from_value(value.clone())?;
            if rejection.is_approval_required() {
                return Ok(Self::ApprovalRequired(rejection));
            }
        }
        serde_json::from_value(value)
            .map(Self::Data)
            .map_err(|e| SyncError::Protocol(format!("unexpected response: {e}")))
    }
}
