//! Sync engine configuration.
//!
//! The defaults reproduce the reference policy every deployed peer uses;
//! tests override ports and timeouts through the builder helpers.

use crate::error::{SyncError, SyncResult};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Fully qualified DNS-SD service type. Doubles as the protocol version.
pub const SERVICE_TYPE: &str = "_babytracker._tcp.local.";

/// Base instance name advertised on the network.
pub const SERVICE_INSTANCE: &str = "BabyTracker";

/// TCP port for the sync listener.
pub const DEFAULT_PORT: u16 = 47654;

/// Size and validation limits applied to every exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncLimits {
    /// Ceiling for a single newline-terminated message, in bytes.
    pub max_message_bytes: usize,
    /// Maximum events per message.
    pub max_events: usize,
    /// Maximum tombstones per message.
    pub max_tombstones: usize,
    /// Notes are truncated to this many characters.
    pub max_note_chars: usize,
    /// Peer display names are truncated to this many characters.
    pub max_device_name_chars: usize,
    /// Largest accepted quantity; zero is the smallest.
    pub max_milliliters: i32,
}

impl Default for SyncLimits {
    fn default() -> Self {
        Self {
            max_message_bytes: 5 * 1024 * 1024,
            max_events: 5_000,
            max_tombstones: 5_000,
            max_note_chars: 1_000,
            max_device_name_chars: 64,
            max_milliliters: 9_999,
        }
    }
}

/// Configuration for the sync service.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// DNS-SD service type advertised and browsed.
    pub service_type: String,
    /// Instance name prefix; the device's short id is appended.
    pub instance_name: String,
    /// Port the listener binds and is advertised on.
    pub port: u16,
    /// Address the listener binds.
    pub bind_addr: IpAddr,
    /// Dial timeout.
    pub connect_timeout: Duration,
    /// Per read/write timeout on an open socket.
    pub io_timeout: Duration,
    /// Ceiling for one complete outbound exchange.
    pub exchange_timeout: Duration,
    /// How long a sync waits for a discovered peer.
    pub discovery_timeout: Duration,
    /// How long a terminal state stays visible before reverting to idle.
    pub result_hold: Duration,
    /// Message limits.
    pub limits: SyncLimits,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            service_type: SERVICE_TYPE.to_string(),
            instance_name: SERVICE_INSTANCE.to_string(),
            port: DEFAULT_PORT,
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            connect_timeout: Duration::from_secs(5),
            io_timeout: Duration::from_secs(10),
            exchange_timeout: Duration::from_secs(25),
            discovery_timeout: Duration::from_secs(8),
            result_hold: Duration::from_secs(3),
            limits: SyncLimits::default(),
        }
    }
}

impl SyncConfig {
    /// Returns the config with a different listener port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Returns the config with a different bind address.
    #[must_use]
    pub fn with_bind_addr(mut self, addr: IpAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Socket address the listener binds.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }

    /// Rejects configurations that would make every exchange fail.
    pub fn validate(&self) -> SyncResult<()> {
        let timeouts = [
            ("connect_timeout", self.connect_timeout),
            ("io_timeout", self.io_timeout),
            ("exchange_timeout", self.exchange_timeout),
            ("discovery_timeout", self.discovery_timeout),
        ];
        for (name, value) in timeouts {
            if value.is_zero() {
                return Err(SyncError::Config(format!("{name} must be non-zero")));
            }
        }

        let limits = [
            ("max_message_bytes", self.limits.max_message_bytes),
            ("max_events", self.limits.max_events),
            ("max_tombstones", self.limits.max_tombstones),
            ("max_device_name_chars", self.limits.max_device_name_chars),
        ];
        for (name, value) in limits {
            if value == 0 {
                return Err(SyncError::Config(format!("{name} must be non-zero")));
            }
        }
        if self.limits.max_milliliters < 0 {
            return Err(SyncError::Config("max_milliliters must not be negative".into()));
        }
        if self.service_type.is_empty() || self.instance_name.is_empty() {
            return Err(SyncError::Config("service type and instance name are required".into()));
        }
        Ok(())
    }
}
