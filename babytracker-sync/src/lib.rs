//! Local-network peer sync for BabyTracker.
//!
//! Two devices, each with its own private event log, find each other over
//! DNS-SD and merge their histories without any server.
//!
//! # Architecture
//!
//! - **Discovery**: advertises the sync service and tracks peers seen on
//!   the network
//! - **Transport**: one TCP listener for incoming exchanges, one connector
//!   for the user-initiated sync
//! - **Protocol**: newline-delimited JSON carrying the full dataset
//! - **Trust**: unknown devices are rejected until the local user
//!   approves them
//! - **Merge**: tombstones first, then last-write-wins per event
//! - **Service**: ties it together and publishes the sync state
//!
//! ## Exchange
//!
//! 1. The initiator sends its full dataset
//! 2. The listener checks trust, merges, and answers with its own
//!    post-merge dataset
//! 3. The initiator merges the answer
//!
//! # Example
//!
//! ```no_run
//! use babytracker_storage::SqliteStore;
//! use babytracker_sync::{SyncConfig, SyncService};
//! use std::sync::Arc;
//!
//! # async fn run() -> babytracker_sync::SyncResult<()> {
//! let store = Arc::new(SqliteStore::open("babytracker.db")?);
//! let service = SyncService::new(store, SyncConfig::default())?;
//! service.start().await?;
//! let outcome = service.sync_now().await;
//! println!("{outcome}");
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod discovery;
mod engine;
mod error;
pub mod merge;
mod orchestrator;
pub mod protocol;
pub mod state;
pub mod transport;
pub mod trust;

pub use config::{SyncConfig, SyncLimits, DEFAULT_PORT, SERVICE_INSTANCE, SERVICE_TYPE};
pub use discovery::{CandidateRegistry, MdnsDiscovery, PeerCandidate, PeerDiscovery, StaticDiscovery};
pub use engine::{Reply, SyncEngine};
pub use error::{SyncError, SyncResult};
pub use merge::{merge, MergeReport};
pub use orchestrator::SyncService;
pub use protocol::{Rejection, Response, SyncMessage, WireEvent, WireTombstone, REASON_APPROVAL_REQUIRED};
pub use state::SyncState;
pub use trust::{TrustLevel, TrustManager, TrustRequest};
