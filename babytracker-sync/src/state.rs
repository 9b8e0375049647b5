//! Observable state of the user-initiated sync flow.

use std::fmt;

/// Where the outbound sync flow currently is.
///
/// `Idle → Searching → Syncing → {Success, NoDeviceFound, AwaitingApproval,
/// Error} → Idle`. Terminal states revert to `Idle` after the result hold.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SyncState {
    #[default]
    Idle,
    /// Waiting for discovery to report a peer.
    Searching,
    /// Exchanging data with a peer.
    Syncing,
    /// Finished; carries the number of local rows changed.
    Success(usize),
    /// No peer showed up within the discovery wait.
    NoDeviceFound,
    /// The peer's user has to approve this device first.
    AwaitingApproval,
    /// The exchange failed.
    Error(String),
}

impl SyncState {
    /// Returns true while a sync is in flight.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Searching | Self::Syncing)
    }

    /// Returns true for result states that revert to idle.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Success(_) | Self::NoDeviceFound | Self::AwaitingApproval | Self::Error(_)
        )
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Searching => f.write_str("searching"),
            Self::Syncing => f.write_str("syncing"),
            Self::Success(changes) => write!(f, "synced ({changes} changes)"),
            Self::NoDeviceFound => f.write_str("no device found"),
            Self::AwaitingApproval => f.write_str("awaiting approval"),
            Self::Error(message) => write!(f, "error: {message}"),
        }
    }
}
