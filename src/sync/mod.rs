//! Pending-sync machinery for mutations made while offline.
//!
//! - [`OfflineWriter`] sends a mutation and queues it if the network is unreachable
//! - [`DurableQueue`] stores pending entries (SQLite in production, memory in tests)
//! - [`Syncer`] replays them oldest first, stopping at the first failure
//! - [`ConnectivityObserver`] drains on reconnect, at startup and on request
//! - [`StatusHandle`] publishes [`SyncStatus`] snapshots to subscribers

mod drain;
mod entry;
mod observer;
mod probe;
mod queue;
mod status;
mod storage;
mod writer;

pub use drain::{DrainOutcome, Syncer};
pub use entry::{EntryId, PendingSyncEntry};
pub use observer::{Connectivity, ConnectivityObserver, ObserverHandle, Trigger};
pub use probe::{reachable, ConnectivityProbe};
pub use queue::{DurableQueue, MemoryQueue, StoreError, UnavailableQueue};
pub use status::{StatusHandle, SyncStatus};
pub use storage::SqliteQueue;
pub use writer::{OfflineWriter, WriteOutcome};
