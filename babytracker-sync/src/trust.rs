//! Trust gate for incoming sync requests.
//!
//! A requester is let through when it is this device, was approved for the
//! current process run, or was approved permanently. Anyone else gets a
//! rejection and lands in a single pending-request slot that the UI can
//! resolve. A newer request replaces an unresolved older one.

use crate::error::SyncResult;
use babytracker_storage::TrustedPeerStore;
use babytracker_types::{DeviceId, TrustedPeer};
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use tokio::sync::watch;
use tracing::{debug, info};

/// An unknown device waiting for the local user's decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustRequest {
    pub device_id: DeviceId,
    /// Length-capped label shown to the user.
    pub display_name: String,
}

/// Why a requester was let through, or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustLevel {
    /// The requester is this device.
    Own,
    /// Approved for this process run.
    Session,
    /// Approved permanently.
    Persistent,
    /// Not approved.
    Unknown,
}

impl TrustLevel {
    /// Returns true if the request may be merged.
    pub fn is_allowed(self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

/// Label for an unknown device: its name capped at `max_chars`, or the
/// short form of its id when the name is empty.
pub fn display_label(device_id: &DeviceId, name: &str, max_chars: usize) -> String {
    let capped: String = name.chars().take(max_chars).collect();
    if capped.is_empty() {
        device_id.short()
    } else {
        capped
    }
}

/// Owns session trust and the pending request slot, and consults the
/// persistent allow-list.
pub struct TrustManager<S: ?Sized> {
    local_device_id: DeviceId,
    store: Arc<S>,
    session: RwLock<HashSet<DeviceId>>,
    pending: watch::Sender<Option<TrustRequest>>,
}

impl<S> TrustManager<S>
where
    S: TrustedPeerStore + ?Sized,
{
    /// Creates a trust manager with an empty session set.
    pub fn new(local_device_id: DeviceId, store: Arc<S>) -> Self {
        let (pending, _) = watch::channel(None);
        Self {
            local_device_id,
            store,
            session: RwLock::new(HashSet::new()),
            pending,
        }
    }

    /// This device's id.
    pub fn local_device_id(&self) -> &DeviceId {
        &self.local_device_id
    }

    /// Classifies a requester.
    pub fn check(&self, device_id: &DeviceId) -> SyncResult<TrustLevel> {
        if *device_id == self.local_device_id {
            return Ok(TrustLevel::Own);
        }
        if self.is_session_trusted(device_id) {
            return Ok(TrustLevel::Session);
        }
        if self.store.is_trusted(device_id)? {
            return Ok(TrustLevel::Persistent);
        }
        Ok(TrustLevel::Unknown)
    }

    fn is_session_trusted(&self, device_id: &DeviceId) -> bool {
        let session = self.session.read().unwrap_or_else(|e| e.into_inner());
        session.contains(device_id)
    }

    /// Publishes a pending request, replacing any unresolved one.
    pub fn request_approval(&self, request: TrustRequest) {
        info!(device = %request.device_id, name = %request.display_name, "approval requested");
        self.pending.send_replace(Some(request));
    }

    /// The unresolved request, if any.
    pub fn pending(&self) -> Option<TrustRequest> {
        self.pending.borrow().clone()
    }

    /// Subscribes to pending-request changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<TrustRequest>> {
        self.pending.subscribe()
    }

    /// Approves the pending request. With `permanent`, the device is also
    /// written to the allow-list. No-op without a pending request.
    pub fn approve(&self, permanent: bool) -> SyncResult<Option<TrustRequest>> {
        let Some(request) = self.pending.send_replace(None) else {
            return Ok(None);
        };

        {
            let mut session = self.session.write().unwrap_or_else(|e| e.into_inner());
            session.insert(request.device_id.clone());
        }

        if permanent {
            self.store.save_trusted_peer(&TrustedPeer::new(
                request.device_id.clone(),
                request.display_name.clone(),
            ))?;
            info!(device = %request.device_id, name = %request.display_name, "trusted permanently");
        } else {
            info!(device = %request.device_id, name = %request.display_name, "trusted for this session");
        }
        Ok(Some(request))
    }

    /// Discards the pending request without trusting anyone.
    pub fn deny(&self) -> Option<TrustRequest> {
        let request = self.pending.send_replace(None);
        if let Some(request) = &request {
            info!(device = %request.device_id, name = %request.display_name, "trust denied");
        }
        request
    }

    /// Permanently trusted peers, most recently approved first.
    pub fn trusted_peers(&self) -> SyncResult<Vec<TrustedPeer>> {
        Ok(self.store.trusted_peers()?)
    }

    /// Drops a device from both the allow-list and the session set.
    /// Returns true if it was trusted in either.
    pub fn revoke(&self, device_id: &DeviceId) -> SyncResult<bool> {
        let from_session = {
            let mut session = self.session.write().unwrap_or_else(|e| e.into_inner());
            session.remove(device_id)
        };
        let from_store = self.store.remove_trusted_peer(device_id)?;
        debug!(device = %device_id, from_session, from_store, "revoked trust");
        Ok(from_session || from_store)
    }
}
