//! SQLite storage layer for BabyTracker.
//!
//! Persists the event log, deletion tombstones, the trusted-device
//! allow-list and a few preferences. The sync engine talks to storage only
//! through the traits in [`store`], so hosts may plug in their own backend;
//! [`SqliteStore`] is the bundled one.
//!
//! # Architecture
//!
//! - Events are keyed by a unique sync id shared across devices
//! - Tombstones are insert-only and never removed
//! - Schema setup runs automatically on open

mod error;
mod repository;
mod schema;
mod sqlite;
mod store;

pub use error::{StorageError, StorageResult};
pub use repository::EventRepository;
pub use schema::SCHEMA_VERSION;
pub use sqlite::SqliteStore;
pub use store::{EventStore, Preferences, SyncStore, TombstoneStore, TrustedPeerStore};
