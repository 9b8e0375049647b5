//! Core type definitions for the BabyTracker sync engine.
//!
//! This crate defines the plain data types shared by storage and sync:
//! - Sync and device identifiers
//! - Millisecond wall-clock timestamps
//! - Logged events, deletion tombstones and trusted peers
//! - The closed event vocabulary (types and sub types)

mod event;
mod ids;
mod peer;
mod timestamp;

pub use event::{Event, EventType, SubType, Tombstone};
pub use ids::{DeviceId, SyncId};
pub use peer::TrustedPeer;
pub use timestamp::Timestamp;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    #[error("unknown sub type: {0}")]
    UnknownSubType(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),
}
