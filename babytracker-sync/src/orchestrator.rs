//! Sync service: owns the listener, discovery and the outbound sync flow,
//! and publishes the flow's state for the UI.

use crate::config::SyncConfig;
use crate::discovery::{CandidateRegistry, MdnsDiscovery, PeerDiscovery};
use crate::engine::SyncEngine;
use crate::error::SyncResult;
use crate::protocol::Response;
use crate::state::SyncState;
use crate::transport::{bind, exchange, spawn_listener};
use crate::trust::TrustRequest;
use babytracker_storage::SyncStore;
use babytracker_types::{DeviceId, TrustedPeer};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

struct Running {
    listener: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

/// Published flow state plus a write counter, so a delayed revert can tell
/// whether anything happened since it was scheduled.
struct StateCell {
    tx: watch::Sender<SyncState>,
    generation: AtomicU64,
}

impl StateCell {
    fn set(&self, state: SyncState) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.tx.send_replace(state);
        generation
    }

    /// Publishes a terminal state and schedules its revert to idle.
    fn publish_result(self: &Arc<Self>, outcome: SyncState, hold: Duration) {
        let generation = self.set(outcome);
        // No runtime during shutdown: the result stays, which is not busy.
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let cell = Arc::clone(self);
        runtime.spawn(async move {
            tokio::time::sleep(hold).await;
            cell.tx.send_if_modified(|state| {
                let untouched = cell.generation.load(Ordering::SeqCst) == generation;
                if untouched && state.is_terminal() {
                    *state = SyncState::Idle;
                    true
                } else {
                    false
                }
            });
        });
    }
}

/// Owns one sync attempt's busy state. Dropping it before `finish`
/// (caller cancelled, task aborted) publishes a cancellation error.
struct Attempt {
    cell: Arc<StateCell>,
    hold: Duration,
    finished: bool,
}

impl Attempt {
    fn finish(mut self, outcome: SyncState) -> SyncState {
        self.finished = true;
        self.cell.publish_result(outcome.clone(), self.hold);
        outcome
    }
}

impl Drop for Attempt {
    fn drop(&mut self) {
        if !self.finished {
            warn!("sync cancelled");
            self.cell
                .publish_result(SyncState::Error("sync cancelled".to_string()), self.hold);
        }
    }
}

/// Background sync service for one device.
pub struct SyncService<S: ?Sized> {
    config: Arc<SyncConfig>,
    engine: Arc<SyncEngine<S>>,
    discovery: Arc<dyn PeerDiscovery>,
    registry: Arc<CandidateRegistry>,
    state: Arc<StateCell>,
    running: Mutex<Option<Running>>,
}

impl<S> SyncService<S>
where
    S: SyncStore + Send + Sync + 'static + ?Sized,
{
    /// Creates a service discovering peers over mDNS.
    pub fn new(store: Arc<S>, config: SyncConfig) -> SyncResult<Self> {
        let device_id = store.device_id()?;
        let discovery = Arc::new(MdnsDiscovery::new(&config, device_id));
        Self::with_discovery(store, config, discovery)
    }

    /// Creates a service with a custom discovery source.
    pub fn with_discovery(
        store: Arc<S>,
        config: SyncConfig,
        discovery: Arc<dyn PeerDiscovery>,
    ) -> SyncResult<Self> {
        config.validate()?;
        let engine = Arc::new(SyncEngine::new(store, config.limits.clone())?);
        let (tx, _) = watch::channel(SyncState::Idle);
        Ok(Self {
            config: Arc::new(config),
            engine,
            discovery,
            registry: Arc::new(CandidateRegistry::new()),
            state: Arc::new(StateCell {
                tx,
                generation: AtomicU64::new(0),
            }),
            running: Mutex::new(None),
        })
    }

    /// Starts the listener and discovery. Calling it again is a no-op.
    ///
    /// A listener that fails to bind only disables the incoming side;
    /// discovery failures only mean no peer will be found.
    pub async fn start(&self) -> SyncResult<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Ok(());
        }

        let (listener, local_addr) = match bind(self.config.listen_addr()).await {
            Ok(listener) => {
                let local_addr = listener.local_addr().ok();
                let task = spawn_listener(listener, Arc::clone(&self.engine), Arc::clone(&self.config));
                (Some(task), local_addr)
            }
            Err(e) => {
                error!(addr = %self.config.listen_addr(), error = %e, "sync listener unavailable");
                (None, None)
            }
        };

        if let Err(e) = self.discovery.start(Arc::clone(&self.registry)).await {
            warn!(error = %e, "peer discovery unavailable");
        }

        *running = Some(Running { listener, local_addr });
        info!(device = %self.engine.device_id(), "sync service started");
        Ok(())
    }

    /// Stops the listener and discovery and forgets discovered peers.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };
        if let Some(listener) = running.listener {
            listener.abort();
        }
        self.discovery.stop().await;
        self.registry.clear();
        info!("sync service stopped");
    }

    /// Returns true between `start` and `stop`.
    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Address the listener is bound to, if it is up.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().await.as_ref().and_then(|r| r.local_addr)
    }

    /// Current flow state.
    pub fn state(&self) -> SyncState {
        self.state.tx.borrow().clone()
    }

    /// Subscribes to flow state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
        self.state.tx.subscribe()
    }

    /// The engine answering incoming requests.
    pub fn engine(&self) -> &Arc<SyncEngine<S>> {
        &self.engine
    }

    /// Peers discovered so far.
    pub fn registry(&self) -> &Arc<CandidateRegistry> {
        &self.registry
    }

    /// This device's id.
    pub fn device_id(&self) -> &DeviceId {
        self.engine.device_id()
    }

    /// The unresolved trust request, if any.
    pub fn pending_trust_request(&self) -> Option<TrustRequest> {
        self.engine.trust().pending()
    }

    /// Subscribes to trust request changes.
    pub fn subscribe_trust_requests(&self) -> watch::Receiver<Option<TrustRequest>> {
        self.engine.trust().subscribe()
    }

    /// Approves the pending trust request.
    pub fn approve_trust(&self, permanent: bool) -> SyncResult<Option<TrustRequest>> {
        self.engine.trust().approve(permanent)
    }

    /// Denies the pending trust request.
    pub fn deny_trust(&self) -> Option<TrustRequest> {
        self.engine.trust().deny()
    }

    /// Permanently trusted peers, newest first.
    pub fn trusted_peers(&self) -> SyncResult<Vec<TrustedPeer>> {
        self.engine.trust().trusted_peers()
    }

    /// Revokes a peer's trust.
    pub fn revoke_trust(&self, device_id: &DeviceId) -> SyncResult<bool> {
        self.engine.trust().revoke(device_id)
    }

    /// Runs one user-initiated sync and returns its result state.
    ///
    /// While a sync is already searching or syncing this returns the
    /// current state without doing anything.
    pub async fn sync_now(&self) -> SyncState {
        let started = self.state.tx.send_if_modified(|state| {
            if state.is_busy() {
                false
            } else {
                self.state.generation.fetch_add(1, Ordering::SeqCst);
                *state = SyncState::Searching;
                true
            }
        });
        if !started {
            return self.state();
        }
        let attempt = Attempt {
            cell: Arc::clone(&self.state),
            hold: self.config.result_hold,
            finished: false,
        };

        let Some(candidate) = self
            .registry
            .wait_for_candidate(self.config.discovery_timeout)
            .await
        else {
            info!("no peer found");
            return attempt.finish(SyncState::NoDeviceFound);
        };

        self.state.set(SyncState::Syncing);
        info!(peer = %candidate.name, addr = %candidate.addr, "syncing");

        let outcome = match tokio::time::timeout(
            self.config.exchange_timeout,
            self.run_exchange(candidate.addr),
        )
        .await
        {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                warn!(addr = %candidate.addr, error = %e, "sync failed");
                SyncState::Error(e.to_string())
            }
            Err(_) => {
                warn!(addr = %candidate.addr, timeout = ?self.config.exchange_timeout, "sync timed out");
                SyncState::Error("sync timed out".to_string())
            }
        };
        attempt.finish(outcome)
    }

    async fn run_exchange(&self, addr: SocketAddr) -> SyncResult<SyncState> {
        let engine = Arc::clone(&self.engine);
        let request = tokio::task::spawn_blocking(move || engine.build_outbound()).await??;

        match exchange(addr, &request, &self.config).await? {
            Response::ApprovalRequired(rejection) => {
                info!(peer = %rejection.device_name, "peer requires approval");
                Ok(SyncState::AwaitingApproval)
            }
            Response::Data(response) => {
                let engine = Arc::clone(&self.engine);
                let report =
                    tokio::task::spawn_blocking(move || engine.apply_response(&response)).await??;
                Ok(SyncState::Success(report.changes()))
            }
        }
    }
}
