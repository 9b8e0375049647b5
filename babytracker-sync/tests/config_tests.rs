use babytracker_sync::{SyncConfig, SyncError, SyncLimits, DEFAULT_PORT, SERVICE_TYPE};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

#[test]
fn defaults_match_reference_policy() {
    let config = SyncConfig::default();
    assert_eq!(config.service_type, SERVICE_TYPE);
    assert_eq!(config.service_type, "_babytracker._tcp.local.");
    assert_eq!(config.instance_name, "BabyTracker");
    assert_eq!(config.port, 47654);
    assert_eq!(DEFAULT_PORT, 47654);
    assert_eq!(config.connect_timeout, Duration::from_secs(5));
    assert_eq!(config.io_timeout, Duration::from_secs(10));
    assert_eq!(config.exchange_timeout, Duration::from_secs(25));
    assert_eq!(config.discovery_timeout, Duration::from_secs(8));
    assert_eq!(config.result_hold, Duration::from_secs(3));
    assert!(config.validate().is_ok());
}

#[test]
fn default_limits() {
    let limits = SyncLimits::default();
    assert_eq!(limits.max_message_bytes, 5 * 1024 * 1024);
    assert_eq!(limits.max_events, 5_000);
    assert_eq!(limits.max_tombstones, 5_000);
    assert_eq!(limits.max_note_chars, 1_000);
    assert_eq!(limits.max_device_name_chars, 64);
    assert_eq!(limits.max_milliliters, 9_999);
}

#[test]
fn builders_set_listen_addr() {
    let config = SyncConfig::default()
        .with_port(0)
        .with_bind_addr(IpAddr::V4(Ipv4Addr::LOCALHOST));
    assert_eq!(config.listen_addr().to_string(), "127.0.0.1:0");
}

#[test]
fn zero_timeout_is_rejected() {
    let config = SyncConfig {
        exchange_timeout: Duration::ZERO,
        ..SyncConfig::default()
    };
    assert!(matches!(config.validate(), Err(SyncError::Config(_))));
}

#[test]
fn zero_limit_is_rejected() {
    let config = SyncConfig {
        limits: SyncLimits {
            max_message_bytes: 0,
            ..SyncLimits::default()
        },
        ..SyncConfig::default()
    };
    assert!(config.validate().is_err());
}
