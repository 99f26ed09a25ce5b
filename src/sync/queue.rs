//! Durable queue interface and the in-memory implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

use super::entry::{EntryId, PendingSyncEntry};
use crate::net::RequestDescriptor;

/// Errors from a durable queue backend.
#[derive(Debug, Error)]
pub enum StoreError {
  #[error("pending entry {0} not found")]
  NotFound(EntryId),
  #[error("durable store error: {0}")]
  Backend(String),
  #[error("failed to encode pending entry: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for StoreError {
  fn from(e: rusqlite::Error) -> Self {
    StoreError::Backend(e.to_string())
  }
}

/// FIFO store of pending mutations that survives restarts (for durable backends).
#[async_trait]
pub trait DurableQueue: Send + Sync {
  /// Persist a new entry at the back of the queue.
  async fn enqueue(&self, request: RequestDescriptor) -> Result<PendingSyncEntry, StoreError>;

  /// Oldest entry, if any.
  async fn front(&self) -> Result<Option<PendingSyncEntry>, StoreError>;

  /// All entries, oldest first.
  async fn entries(&self) -> Result<Vec<PendingSyncEntry>, StoreError>;

  /// Delete one entry.
  async fn remove(&self, id: &EntryId) -> Result<(), StoreError>;

  async fn count(&self) -> Result<usize, StoreError>;

  /// When the queue was last fully drained.
  async fn last_synced_at(&self) -> Result<Option<DateTime<Utc>>, StoreError>;

  async fn record_sync(&self, at: DateTime<Utc>) -> Result<(), StoreError>;

  /// Take or renew the drain lease for `owner`, valid for `ttl`.
  ///
  /// Returns `false` while another owner holds an unexpired lease. Queues
  /// that live inside one process have no other drainers and always grant it.
  async fn claim_drain(&self, _owner: &str, _ttl: Duration) -> Result<bool, StoreError> {
    Ok(true)
  }

  /// Give up the lease if `owner` still holds it.
  async fn release_drain(&self, _owner: &str) -> Result<(), StoreError> {
    Ok(())
  }
}

/// Queue kept in process memory. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryQueue {
  entries: Mutex<VecDeque<PendingSyncEntry>>,
  last_sync: Mutex<Option<DateTime<Utc>>>,
}

impl MemoryQueue {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock_entries(&self) -> Result<std::sync::MutexGuard<'_, VecDeque<PendingSyncEntry>>, StoreError> {
    self
      .entries
      .lock()
      .map_err(|e| StoreError::Backend(format!("lock poisoned: {}", e)))
  }
}

#[async_trait]
impl DurableQueue for MemoryQueue {
  async fn enqueue(&self, request: RequestDescriptor) -> Result<PendingSyncEntry, StoreError> {
    let entry = PendingSyncEntry::new(request);
    self.lock_entries()?.push_back(entry.clone());
    Ok(entry)
  }

  async fn front(&self) -> Result<Option<PendingSyncEntry>, StoreError> {
    Ok(self.lock_entries()?.front().cloned())
  }

  async fn entries(&self) -> Result<Vec<PendingSyncEntry>, StoreError> {
    Ok(self.lock_entries()?.iter().cloned().collect())
  }

  async fn remove(&self, id: &EntryId) -> Result<(), StoreError> {
    let mut entries = self.lock_entries()?;
    match entries.iter().position(|e| &e.id == id) {
      Some(index) => {
        entries.remove(index);
        Ok(())
      }
      None => Err(StoreError::NotFound(id.clone())),
    }
  }

  async fn count(&self) -> Result<usize, StoreError> {
    Ok(self.lock_entries()?.len())
  }

  async fn last_synced_at(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
    self
      .last_sync
      .lock()
      .map(|guard| *guard)
      .map_err(|e| StoreError::Backend(format!("lock poisoned: {}", e)))
  }

  async fn record_sync(&self, at: DateTime<Utc>) -> Result<(), StoreError> {
    let mut guard = self
      .last_sync
      .lock()
      .map_err(|e| StoreError::Backend(format!("lock poisoned: {}", e)))?;
    *guard = Some(at);
    Ok(())
  }
}

/// Stand-in used when the offline database cannot be opened.
///
/// Every operation fails with the open error, so writes come back as
/// dropped and the queue reads as empty.
pub struct UnavailableQueue {
  reason: String,
}

impl UnavailableQueue {
  pub fn new(reason: impl Into<String>) -> Self {
    Self {
      reason: reason.into(),
    }
  }

  fn error(&self) -> StoreError {
    StoreError::Backend(self.reason.clone())
  }
}

#[async_trait]
impl DurableQueue for UnavailableQueue {
  async fn enqueue(&self, _request: RequestDescriptor) -> Result<PendingSyncEntry, StoreError> {
    Err(self.error())
  }

  async fn front(&self) -> Result<Option<PendingSyncEntry>, StoreError> {
    Err(self.error())
  }

  async fn entries(&self) -> Result<Vec<PendingSyncEntry>, StoreError> {
    Err(self.error())
  }

  async fn remove(&self, _id: &EntryId) -> Result<(), StoreError> {
    Err(self.error())
  }

  async fn count(&self) -> Result<usize, StoreError> {
    Err(self.error())
  }

  async fn last_synced_at(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
    Err(self.error())
  }

  async fn record_sync(&self, _at: DateTime<Utc>) -> Result<(), StoreError> {
    Err(self.error())
  }
}
