//! Permanently trusted remote devices.

use crate::{DeviceId, Timestamp};
use serde::{Deserialize, Serialize};

/// A remote device the local user approved permanently.
///
/// Rows are never mutated after creation, only removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustedPeer {
    /// The peer's stable device id.
    pub device_id: DeviceId,
    /// Label the peer supplied at handshake time (already length-capped).
    pub display_name: String,
    /// When the user approved the peer.
    pub added_at: Timestamp,
}

impl TrustedPeer {
    /// Creates a trusted peer approved now.
    #[must_use]
    pub fn new(device_id: DeviceId, display_name: impl Into<String>) -> Self {
        Self {
            device_id,
            display_name: display_name.into(),
            added_at: Timestamp::now(),
        }
    }
}
