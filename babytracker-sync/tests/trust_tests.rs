use babytracker_storage::{SqliteStore, TrustedPeerStore};
use babytracker_sync::trust::display_label;
use babytracker_sync::{TrustLevel, TrustManager, TrustRequest};
use babytracker_types::{DeviceId, TrustedPeer};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn manager() -> (TrustManager<SqliteStore>, Arc<SqliteStore>) {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let manager = TrustManager::new(DeviceId::from("local"), Arc::clone(&store));
    (manager, store)
}

fn request(id: &str, name: &str) -> TrustRequest {
    TrustRequest {
        device_id: DeviceId::from(id),
        display_name: name.to_string(),
    }
}

// ── Classification ──────────────────────────────────────────────

#[test]
fn own_device_is_trusted() {
    let (trust, _) = manager();
    assert_eq!(trust.check(&DeviceId::from("local")).unwrap(), TrustLevel::Own);
}

#[test]
fn stranger_is_unknown() {
    let (trust, _) = manager();
    let level = trust.check(&DeviceId::from("stranger")).unwrap();
    assert_eq!(level, TrustLevel::Unknown);
    assert!(!level.is_allowed());
}

#[test]
fn stored_peer_is_persistent() {
    let (trust, store) = manager();
    store
        .save_trusted_peer(&TrustedPeer::new(DeviceId::from("friend"), "Friend"))
        .unwrap();
    assert_eq!(
        trust.check(&DeviceId::from("friend")).unwrap(),
        TrustLevel::Persistent
    );
}

// ── Pending requests ────────────────────────────────────────────

#[test]
fn newer_request_replaces_pending_one() {
    let (trust, _) = manager();
    trust.request_approval(request("a", "A"));
    trust.request_approval(request("b", "B"));
    assert_eq!(trust.pending(), Some(request("b", "B")));
}

#[test]
fn approve_for_session_only() {
    let (trust, store) = manager();
    trust.request_approval(request("peer", "Tablet"));

    let approved = trust.approve(false).unwrap();
    assert_eq!(approved, Some(request("peer", "Tablet")));
    assert!(trust.pending().is_none());
    assert_eq!(trust.check(&DeviceId::from("peer")).unwrap(), TrustLevel::Session);
    assert!(!store.is_trusted(&DeviceId::from("peer")).unwrap());
}

#[test]
fn approve_permanently_persists_peer() {
    let (trust, store) = manager();
    trust.request_approval(request("peer", "Tablet"));
    trust.approve(true).unwrap();

    let peers = store.trusted_peers().unwrap();
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].device_id, DeviceId::from("peer"));
    assert_eq!(peers[0].display_name, "Tablet");

    // A fresh manager (new process run) still trusts it.
    let restarted = TrustManager::new(DeviceId::from("local"), Arc::clone(&store));
    assert_eq!(
        restarted.check(&DeviceId::from("peer")).unwrap(),
        TrustLevel::Persistent
    );
}

#[test]
fn session_trust_does_not_outlive_manager() {
    let (trust, store) = manager();
    trust.request_approval(request("peer", "Tablet"));
    trust.approve(false).unwrap();

    let restarted = TrustManager::new(DeviceId::from("local"), store);
    assert_eq!(
        restarted.check(&DeviceId::from("peer")).unwrap(),
        TrustLevel::Unknown
    );
}

#[test]
fn deny_clears_pending_without_trusting() {
    let (trust, _) = manager();
    trust.request_approval(request("peer", "Tablet"));
    assert_eq!(trust.deny(), Some(request("peer", "Tablet")));
    assert!(trust.pending().is_none());
    assert_eq!(trust.check(&DeviceId::from("peer")).unwrap(), TrustLevel::Unknown);
}

#[test]
fn resolving_without_pending_is_noop() {
    let (trust, store) = manager();
    assert_eq!(trust.approve(true).unwrap(), None);
    assert_eq!(trust.deny(), None);
    assert!(store.trusted_peers().unwrap().is_empty());
}

#[tokio::test]
async fn subscribers_see_pending_changes() {
    let (trust, _) = manager();
    let mut rx = trust.subscribe();
    assert!(rx.borrow_and_update().is_none());

    trust.request_approval(request("peer", "Tablet"));
    rx.changed().await.unwrap();
    assert_eq!(*rx.borrow_and_update(), Some(request("peer", "Tablet")));

    trust.deny();
    rx.changed().await.unwrap();
    assert!(rx.borrow().is_none());
}

// ── Management ──────────────────────────────────────────────────

#[test]
fn revoke_removes_session_and_persistent_trust() {
    let (trust, _) = manager();
    trust.request_approval(request("peer", "Tablet"));
    trust.approve(true).unwrap();

    assert!(trust.revoke(&DeviceId::from("peer")).unwrap());
    assert_eq!(trust.check(&DeviceId::from("peer")).unwrap(), TrustLevel::Unknown);
    assert!(trust.trusted_peers().unwrap().is_empty());
    assert!(!trust.revoke(&DeviceId::from("peer")).unwrap());
}

// ── Labels ──────────────────────────────────────────────────────

#[test]
fn label_caps_name_length() {
    let id = DeviceId::from("0123456789abcdef");
    let long = "x".repeat(100);
    assert_eq!(display_label(&id, &long, 64).len(), 64);
    assert_eq!(display_label(&id, "Phone", 64), "Phone");
}

#[test]
fn label_falls_back_to_short_id() {
    let id = DeviceId::from("0123456789abcdef");
    assert_eq!(display_label(&id, "", 64), "01234567");
}
