use babytracker_storage::{
    EventRepository, EventStore, SqliteStore, StorageError, TombstoneStore,
};
use babytracker_types::{Event, SubType, Timestamp};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn repo() -> EventRepository<SqliteStore> {
    EventRepository::new(Arc::new(SqliteStore::open_in_memory().unwrap()))
}

#[test]
fn log_assigns_local_id() {
    let repo = repo();
    let logged = repo.log(Event::diaper(SubType::Pee)).unwrap();
    assert!(logged.local_id > 0);
    assert_eq!(repo.all().unwrap(), vec![logged]);
}

#[test]
fn edit_advances_updated_at_and_keeps_sync_id() {
    let repo = repo();
    let logged = repo
        .log(Event::feeding(SubType::Bottle, Some(60)).at(Timestamp::from_millis(1_000)))
        .unwrap();

    let mut edited = logged.clone();
    edited.milliliters = Some(80);
    edited.sync_id = "should-be-ignored".into();
    let saved = repo.edit(edited).unwrap();

    assert_eq!(saved.sync_id, logged.sync_id);
    assert!(saved.updated_at > logged.updated_at);
    let stored = repo.store().event_by_id(logged.local_id).unwrap().unwrap();
    assert_eq!(stored.milliliters, Some(80));
    assert_eq!(stored.updated_at, saved.updated_at);
}

#[test]
fn edit_never_moves_updated_at_backwards() {
    let repo = repo();
    let far_future = Timestamp::from_millis(i64::MAX / 2);
    let logged = repo
        .log(Event::spit_up().at(Timestamp::from_millis(1)).updated(far_future))
        .unwrap();

    let saved = repo.edit(logged.clone().with_note("small")).unwrap();
    assert_eq!(saved.updated_at, far_future);
}

#[test]
fn edit_missing_event_is_not_found() {
    let repo = repo();
    let mut ghost = Event::spit_up();
    ghost.local_id = 1234;
    assert!(matches!(repo.edit(ghost), Err(StorageError::NotFound(_))));
}

#[test]
fn delete_leaves_tombstone() {
    let repo = repo();
    let logged = repo.log(Event::diaper(SubType::Poop)).unwrap();

    assert!(repo.delete(&logged).unwrap());
    assert!(repo.all().unwrap().is_empty());
    assert!(repo.store().has_tombstone(&logged.sync_id).unwrap());

    // A second delete still reports the row as gone and keeps one tombstone.
    assert!(!repo.delete(&logged).unwrap());
    assert_eq!(repo.store().all_tombstones().unwrap().len(), 1);
}
