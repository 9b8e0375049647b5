//! Peer discovery over DNS-SD and the candidate registry it feeds.
//!
//! Discovery sources only report what they see; the [`CandidateRegistry`]
//! decides which peer a sync should dial. The most recently seen service
//! wins, and losing a service only clears it if no other service remains.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use babytracker_types::DeviceId;
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// TXT record key carrying the advertiser's device id.
const TXT_DEVICE_ID: &str = "id";

/// A resolved peer that a sync may dial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerCandidate {
    /// Service instance name, unique per advertiser.
    pub name: String,
    /// Resolved address.
    pub addr: SocketAddr,
    /// When the service was last reported.
    pub last_seen: Instant,
    seq: u64,
}

#[derive(Default)]
struct RegistryInner {
    candidates: HashMap<String, PeerCandidate>,
    next_seq: u64,
}

impl RegistryInner {
    fn best(&self) -> Option<PeerCandidate> {
        self.candidates.values().max_by_key(|c| c.seq).cloned()
    }
}

/// Known peers keyed by service instance name.
pub struct CandidateRegistry {
    inner: Mutex<RegistryInner>,
    best: watch::Sender<Option<PeerCandidate>>,
}

impl Default for CandidateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CandidateRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        let (best, _) = watch::channel(None);
        Self {
            inner: Mutex::new(RegistryInner::default()),
            best,
        }
    }

    /// Records a sighting. The sighted service becomes the best candidate.
    pub fn upsert(&self, name: impl Into<String>, addr: SocketAddr) {
        let name = name.into();
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.next_seq += 1;
        let candidate = PeerCandidate {
            name: name.clone(),
            addr,
            last_seen: Instant::now(),
            seq: inner.next_seq,
        };
        debug!(%name, %addr, "candidate seen");
        inner.candidates.insert(name, candidate);
        self.best.send_replace(inner.best());
    }

    /// Forgets a service. Returns true if it was known.
    pub fn remove(&self, name: &str) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let removed = inner.candidates.remove(name).is_some();
        if removed {
            debug!(%name, "candidate lost");
            self.best.send_replace(inner.best());
        }
        removed
    }

    /// Forgets every service.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.candidates.clear();
        self.best.send_replace(None);
    }

    /// The most recently seen candidate.
    pub fn best(&self) -> Option<PeerCandidate> {
        self.best.borrow().clone()
    }

    /// Number of known services.
    pub fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.candidates.len()
    }

    /// Returns true if no service is known.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Subscribes to best-candidate changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<PeerCandidate>> {
        self.best.subscribe()
    }

    /// Waits up to `timeout` for any candidate to exist.
    pub async fn wait_for_candidate(&self, timeout: Duration) -> Option<PeerCandidate> {
        let mut rx = self.best.subscribe();
        match tokio::time::timeout(timeout, rx.wait_for(Option::is_some)).await {
            Ok(Ok(best)) => best.clone(),
            _ => None,
        }
    }
}

/// A source of peer sightings.
#[async_trait]
pub trait PeerDiscovery: Send + Sync {
    /// Starts advertising and browsing, reporting into `registry`.
    /// Failures should be logged; a failed source simply finds nobody.
    async fn start(&self, registry: Arc<CandidateRegistry>) -> SyncResult<()>;

    /// Stops advertising and browsing.
    async fn stop(&self);
}

/// Fixed list of peers, for hosts with manual peer entry and for tests.
#[derive(Debug, Clone, Default)]
pub struct StaticDiscovery {
    peers: Vec<(String, SocketAddr)>,
}

impl StaticDiscovery {
    /// Creates an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a peer.
    #[must_use]
    pub fn with_peer(mut self, name: impl Into<String>, addr: SocketAddr) -> Self {
        self.peers.push((name.into(), addr));
        self
    }
}

#[async_trait]
impl PeerDiscovery for StaticDiscovery {
    async fn start(&self, registry: Arc<CandidateRegistry>) -> SyncResult<()> {
        for (name, addr) in &self.peers {
            registry.upsert(name.clone(), *addr);
        }
        Ok(())
    }

    async fn stop(&self) {}
}

struct MdnsState {
    daemon: ServiceDaemon,
    browse_task: JoinHandle<()>,
}

/// Multicast DNS-SD advertiser and browser.
pub struct MdnsDiscovery {
    service_type: String,
    instance_name: String,
    port: u16,
    device_id: DeviceId,
    state: Mutex<Option<MdnsState>>,
}

impl MdnsDiscovery {
    /// Creates a discovery source advertising `config.port`.
    ///
    /// The instance name carries the device's short id so that several
    /// devices on one network never collide.
    pub fn new(config: &SyncConfig, device_id: DeviceId) -> Self {
        Self {
            service_type: config.service_type.clone(),
            instance_name: format!("{}-{}", config.instance_name, device_id.short()),
            port: config.port,
            device_id,
            state: Mutex::new(None),
        }
    }

    /// Fully qualified name of our own advertisement.
    pub fn own_fullname(&self) -> String {
        format!("{}.{}", self.instance_name, self.service_type)
    }

    fn register(&self, daemon: &ServiceDaemon) -> SyncResult<()> {
        let host = format!("{}.local.", self.instance_name.to_lowercase());
        let properties = [(TXT_DEVICE_ID, self.device_id.as_str())];
        let info = ServiceInfo::new(
            &self.service_type,
            &self.instance_name,
            &host,
            "",
            self.port,
            &properties[..],
        )
        .map_err(|e| SyncError::Discovery(format!("invalid service info: {e}")))?
        .enable_addr_auto();

        daemon
            .register(info)
            .map_err(|e| SyncError::Discovery(format!("register failed: {e}")))?;
        info!(name = %self.instance_name, port = self.port, "advertising sync service");
        Ok(())
    }

    fn browse(&self, daemon: &ServiceDaemon, registry: Arc<CandidateRegistry>) -> SyncResult<JoinHandle<()>> {
        let receiver = daemon
            .browse(&self.service_type)
            .map_err(|e| SyncError::Discovery(format!("browse failed: {e}")))?;
        let own_fullname = self.own_fullname();
        let own_id = self.device_id.clone();

        Ok(tokio::task::spawn_blocking(move || {
            while let Ok(event) = receiver.recv() {
                match event {
                    ServiceEvent::ServiceResolved(info) => {
                        let fullname = info.get_fullname().to_string();
                        let is_own = fullname == own_fullname
                            || info.get_property_val_str(TXT_DEVICE_ID) == Some(own_id.as_str());
                        if is_own {
                            continue;
                        }
                        match preferred_address(info.get_addresses().iter().map(|a| IpAddr::from(*a))) {
                            Some(ip) => registry.upsert(fullname, SocketAddr::new(ip, info.get_port())),
                            None => debug!(%fullname, "resolved service without address"),
                        }
                    }
                    ServiceEvent::ServiceRemoved(_, fullname) => {
                        registry.remove(&fullname);
                    }
                    _ => {}
                }
            }
            debug!("mdns browse ended");
        }))
    }
}

/// Picks an IPv4 address when one exists.
fn preferred_address(addrs: impl Iterator<Item = IpAddr>) -> Option<IpAddr> {
    let mut fallback = None;
    for addr in addrs {
        if addr.is_ipv4() {
            return Some(addr);
        }
        fallback.get_or_insert(addr);
    }
    fallback
}

#[async_trait]
impl PeerDiscovery for MdnsDiscovery {
    async fn start(&self, registry: Arc<CandidateRegistry>) -> SyncResult<()> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.is_some() {
            return Ok(());
        }

        let daemon = ServiceDaemon::new()
            .map_err(|e| SyncError::Discovery(format!("mdns daemon: {e}")))?;

        // A failed advertisement still lets us find and dial others.
        if let Err(e) = self.register(&daemon) {
            warn!(error = %e, "service registration failed");
        }
        let browse_task = self.browse(&daemon, registry)?;

        *state = Some(MdnsState { daemon, browse_task });
        Ok(())
    }

    async fn stop(&self) {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(MdnsState { daemon, browse_task }) = state {
            if let Err(e) = daemon.unregister(&self.own_fullname()) {
                debug!(error = %e, "unregister failed");
            }
            // Stopping the browse disconnects its receiver, which ends the
            // blocking loop on its own.
            if let Err(e) = daemon.stop_browse(&self.service_type) {
                debug!(error = %e, "stop browse failed");
            }
            if let Err(e) = daemon.shutdown() {
                warn!(error = %e, "mdns shutdown failed");
            }
            drop(browse_task);
            info!("mdns discovery stopped");
        }
    }
}
