use babytracker_storage::{EventStore, Preferences, SqliteStore, TombstoneStore, TrustedPeerStore};
use babytracker_sync::{Reply, SyncEngine, SyncError, SyncLimits, SyncMessage};
use babytracker_types::{DeviceId, Event, SubType, SyncId, Timestamp, Tombstone, TrustedPeer};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn engine_with(limits: SyncLimits) -> SyncEngine<SqliteStore> {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    store.set_device_name("Nursery phone").unwrap();
    SyncEngine::new(store, limits).unwrap()
}

fn engine() -> SyncEngine<SqliteStore> {
    engine_with(SyncLimits::default())
}

fn trust(engine: &SyncEngine<SqliteStore>, id: &str) {
    engine
        .store()
        .save_trusted_peer(&TrustedPeer::new(DeviceId::from(id), id))
        .unwrap();
}

fn request_from(id: &str, name: &str, events: &[Event], tombstones: &[Tombstone]) -> SyncMessage {
    SyncMessage::snapshot(DeviceId::from(id), name, "", events, tombstones)
}

// ── Identity ────────────────────────────────────────────────────

#[test]
fn engine_uses_stored_identity() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    store.set_device_name("Tablet").unwrap();
    let id = store.device_id().unwrap();

    let engine = SyncEngine::new(Arc::clone(&store), SyncLimits::default()).unwrap();
    assert_eq!(engine.device_id(), &id);
    assert_eq!(engine.device_name(), "Tablet");
}

#[test]
fn device_name_is_capped() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    store.set_device_name(&"n".repeat(200)).unwrap();
    let engine = SyncEngine::new(store, SyncLimits::default()).unwrap();
    assert_eq!(engine.device_name().chars().count(), 64);
}

#[test]
fn unset_device_name_falls_back_to_something() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let engine = SyncEngine::new(store, SyncLimits::default()).unwrap();
    assert!(!engine.device_name().is_empty());
}

// ── Outbound ────────────────────────────────────────────────────

#[test]
fn outbound_carries_full_dataset() {
    let engine = engine();
    let event = Event::diaper(SubType::Mixed);
    engine.store().insert_event(&event).unwrap();
    engine
        .store()
        .insert_tombstone(&Tombstone::now(SyncId::from("old")))
        .unwrap();
    engine.store().set_baby_name("Ada").unwrap();

    let out = engine.build_outbound().unwrap();
    assert_eq!(&out.device_id, engine.device_id());
    assert_eq!(out.device_name, "Nursery phone");
    assert_eq!(out.baby_name, "Ada");
    assert_eq!(out.events.len(), 1);
    assert_eq!(out.events[0].sync_id, event.sync_id);
    assert_eq!(out.tombstones.len(), 1);
}

// ── Trust gate ──────────────────────────────────────────────────

#[test]
fn unknown_device_is_rejected_without_touching_store() {
    let engine = engine();
    let request = request_from("stranger", "Their phone", &[Event::spit_up()], &[]);

    let reply = engine.handle_incoming(request).unwrap();
    match reply {
        Reply::Rejected(rejection) => {
            assert!(rejection.is_approval_required());
            assert_eq!(rejection.device_name, "Nursery phone");
        }
        other => panic!("expected rejection, got {other:?}"),
    }

    assert!(engine.store().all_events().unwrap().is_empty());
    let pending = engine.trust().pending().unwrap();
    assert_eq!(pending.device_id, DeviceId::from("stranger"));
    assert_eq!(pending.display_name, "Their phone");
}

#[test]
fn unknown_device_without_name_uses_short_id() {
    let engine = engine();
    engine
        .handle_incoming(request_from("abcdef0123456789", "", &[], &[]))
        .unwrap();
    assert_eq!(engine.trust().pending().unwrap().display_name, "abcdef01");
}

#[test]
fn rejected_tombstones_are_not_applied() {
    let engine = engine();
    let mine = Event::spit_up();
    engine.store().insert_event(&mine).unwrap();

    let attack = request_from("stranger", "", &[], &[Tombstone::now(mine.sync_id.clone())]);
    engine.handle_incoming(attack).unwrap();

    assert!(engine.store().event_by_sync_id(&mine.sync_id).unwrap().is_some());
    assert!(engine.store().all_tombstones().unwrap().is_empty());
}

#[test]
fn own_device_id_is_accepted() {
    let engine = engine();
    let own = engine.device_id().as_str().to_string();
    let reply = engine.handle_incoming(request_from(&own, "", &[], &[])).unwrap();
    assert!(matches!(reply, Reply::Data(_)));
}

#[test]
fn session_approval_lets_next_request_through() {
    let engine = engine();
    let event = Event::spit_up();
    let request = request_from("peer", "Peer", &[event.clone()], &[]);

    engine.handle_incoming(request.clone()).unwrap();
    engine.trust().approve(false).unwrap();

    let reply = engine.handle_incoming(request).unwrap();
    assert!(matches!(reply, Reply::Data(_)));
    assert!(engine.store().event_by_sync_id(&event.sync_id).unwrap().is_some());
}

// ── Trusted requests ────────────────────────────────────────────

#[test]
fn trusted_request_is_merged_and_answered_with_post_merge_state() {
    let engine = engine();
    trust(&engine, "peer");
    let mine = Event::feeding(SubType::BreastLeft, None);
    engine.store().insert_event(&mine).unwrap();
    let theirs = Event::diaper(SubType::Poop);

    let reply = engine
        .handle_incoming(request_from("peer", "Peer", &[theirs.clone()], &[]))
        .unwrap();
    let Reply::Data(snapshot) = reply else {
        panic!("expected data reply");
    };

    let mut ids: Vec<_> = snapshot.events.iter().map(|e| e.sync_id.clone()).collect();
    ids.sort();
    let mut expected = vec![mine.sync_id, theirs.sync_id];
    expected.sort();
    assert_eq!(ids, expected);
}

#[test]
fn oversized_request_is_refused_with_zero_mutations() {
    let engine = engine_with(SyncLimits {
        max_tombstones: 2,
        ..SyncLimits::default()
    });
    trust(&engine, "peer");
    let mine = Event::spit_up();
    engine.store().insert_event(&mine).unwrap();

    let tombstones: Vec<_> = (0..3)
        .map(|i| Tombstone::new(SyncId::from(format!("t{i}")), Timestamp::from_millis(i)))
        .chain(std::iter::once(Tombstone::now(mine.sync_id.clone())))
        .collect();
    let err = engine
        .handle_incoming(request_from("peer", "", &[Event::spit_up()], &tombstones))
        .unwrap_err();

    assert!(matches!(err, SyncError::LimitExceeded { what: "tombstones", .. }));
    assert_eq!(engine.store().all_events().unwrap().len(), 1);
    assert!(engine.store().all_tombstones().unwrap().is_empty());
}

#[test]
fn non_empty_baby_name_is_adopted() {
    let engine = engine();
    trust(&engine, "peer");
    engine.store().set_baby_name("Old").unwrap();

    let mut request = request_from("peer", "", &[], &[]);
    request.baby_name = "Ada".into();
    engine.handle_incoming(request).unwrap();
    assert_eq!(engine.store().baby_name().unwrap(), "Ada");

    engine.handle_incoming(request_from("peer", "", &[], &[])).unwrap();
    assert_eq!(engine.store().baby_name().unwrap(), "Ada");
}

// ── Response side ───────────────────────────────────────────────

#[test]
fn apply_response_reports_changes() {
    let engine = engine();
    let response = request_from("listener", "", &[Event::spit_up(), Event::spit_up()], &[]);
    let report = engine.apply_response(&response).unwrap();
    assert_eq!(report.changes(), 2);
}

#[test]
fn oversized_response_is_an_error() {
    let engine = engine_with(SyncLimits {
        max_events: 1,
        ..SyncLimits::default()
    });
    let response = request_from("listener", "", &[Event::spit_up(), Event::spit_up()], &[]);
    let err = engine.apply_response(&response).unwrap_err();
    assert!(err.is_oversized());
    assert!(engine.store().all_events().unwrap().is_empty());
}
