//! Sync engine: the request/response logic of one exchange, without I/O.
//!
//! The listener feeds decoded requests to [`SyncEngine::handle_incoming`];
//! the connector builds its request with [`SyncEngine::build_outbound`] and
//! applies the listener's answer with [`SyncEngine::apply_response`].
//! Both directions share the same merge.

use crate::config::SyncLimits;
use crate::error::SyncResult;
use crate::merge::{merge, MergeReport};
use crate::protocol::{Rejection, SyncMessage};
use crate::trust::{display_label, TrustManager, TrustRequest};
use babytracker_storage::SyncStore;
use babytracker_types::DeviceId;
use std::sync::Arc;
use tracing::{debug, info, warn};

const FALLBACK_DEVICE_NAME: &str = "BabyTracker";

/// The listener's answer to one request.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Post-merge snapshot of the local store.
    Data(SyncMessage),
    /// The requester is not trusted yet.
    Rejected(Rejection),
}

/// Stateless apart from the trust manager it owns.
pub struct SyncEngine<S: ?Sized> {
    store: Arc<S>,
    trust: Arc<TrustManager<S>>,
    limits: SyncLimits,
    device_id: DeviceId,
    device_name: String,
}

impl<S> SyncEngine<S>
where
    S: SyncStore + ?Sized,
{
    /// Creates an engine over `store`, loading (or generating) the device
    /// identity from its preferences.
    pub fn new(store: Arc<S>, limits: SyncLimits) -> SyncResult<Self> {
        let device_id = store.device_id()?;
        let configured = store.device_name()?.unwrap_or_default();
        let device_name = local_device_name(&configured, limits.max_device_name_chars);
        let trust = Arc::new(TrustManager::new(device_id.clone(), Arc::clone(&store)));

        info!(device = %device_id, name = %device_name, "sync engine ready");
        Ok(Self {
            store,
            trust,
            limits,
            device_id,
            device_name,
        })
    }

    /// This device's id.
    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    /// This device's display name as sent to peers.
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// The trust manager consulted for incoming requests.
    pub fn trust(&self) -> &Arc<TrustManager<S>> {
        &self.trust
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Active limits.
    pub fn limits(&self) -> &SyncLimits {
        &self.limits
    }

    /// Snapshot of the full local dataset.
    pub fn build_outbound(&self) -> SyncResult<SyncMessage> {
        let events = self.store.all_events()?;
        let tombstones = self.store.all_tombstones()?;
        let baby_name = self.store.baby_name()?;
        Ok(SyncMessage::snapshot(
            self.device_id.clone(),
            self.device_name.clone(),
            baby_name,
            &events,
            &tombstones,
        ))
    }

    /// Handles a request received by the listener.
    ///
    /// Untrusted requesters are rejected before their payload is looked
    /// at and become the pending trust request. Oversized payloads fail
    /// with a limit error and must be answered by closing the connection.
    pub fn handle_incoming(&self, request: SyncMessage) -> SyncResult<Reply> {
        let level = self.trust.check(&request.device_id)?;
        if !level.is_allowed() {
            let display_name = display_label(
                &request.device_id,
                &request.device_name,
                self.limits.max_device_name_chars,
            );
            self.trust.request_approval(TrustRequest {
                device_id: request.device_id,
                display_name,
            });
            return Ok(Reply::Rejected(Rejection::approval_required(
                self.device_name.clone(),
            )));
        }

        if let Err(e) = request.check_limits(&self.limits) {
            warn!(device = %request.device_id, error = %e, "rejected oversized request");
            return Err(e);
        }

        debug!(
            device = %request.device_id,
            ?level,
            events = request.events.len(),
            tombstones = request.tombstones.len(),
            "merging request"
        );
        self.apply_remote(&request)?;
        Ok(Reply::Data(self.build_outbound()?))
    }

    /// Applies the listener's snapshot on the connector side.
    pub fn apply_response(&self, response: &SyncMessage) -> SyncResult<MergeReport> {
        if let Err(e) = response.check_limits(&self.limits) {
            warn!(device = %response.device_id, error = %e, "rejected oversized response");
            return Err(e);
        }
        self.apply_remote(response)
    }

    fn apply_remote(&self, remote: &SyncMessage) -> SyncResult<MergeReport> {
        let report = merge(self.store.as_ref(), remote, &self.limits)?;
        if !remote.baby_name.is_empty() {
            self.store.set_baby_name(&remote.baby_name)?;
        }
        info!(device = %remote.device_id, %report, "merged peer data");
        Ok(report)
    }
}

/// Picks the display name: the configured one, else the host name, capped.
fn local_device_name(configured: &str, max_chars: usize) -> String {
    let name = if configured.trim().is_empty() {
        hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .filter(|h| !h.trim().is_empty())
            .unwrap_or_else(|| FALLBACK_DEVICE_NAME.to_string())
    } else {
        configured.to_string()
    };
    name.trim().chars().take(max_chars).collect()
}
