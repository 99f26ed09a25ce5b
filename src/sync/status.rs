//! Sync status snapshot and the container that publishes it.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;

use super::queue::DurableQueue;

/// Point-in-time view of the sync machinery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStatus {
  pub online: bool,
  pub last_sync: Option<DateTime<Utc>>,
  pub in_progress: bool,
  /// Number of undeleted pending entries
  pub pending: usize,
}

/// Owns the current [`SyncStatus`] and notifies subscribers on change.
///
/// Clones share the same state. Readers get immutable snapshots via
/// [`StatusHandle::snapshot`] or a [`watch::Receiver`].
#[derive(Clone)]
pub struct StatusHandle {
  tx: Arc<watch::Sender<SyncStatus>>,
}

impl StatusHandle {
  pub fn new(initial: SyncStatus) -> Self {
    let (tx, _rx) = watch::channel(initial);
    Self { tx: Arc::new(tx) }
  }

  /// Rebuild status from durable storage at startup.
  ///
  /// Storage errors are logged and treated as an empty queue.
  pub async fn restore(queue: &dyn DurableQueue, online: bool) -> Self {
    let pending = match queue.count().await {
      Ok(n) => n,
      Err(e) => {
        tracing::error!(error = %e, "failed to read pending count, assuming empty");
        0
      }
    };
    let last_sync = match queue.last_synced_at().await {
      Ok(at) => at,
      Err(e) => {
        tracing::error!(error = %e, "failed to read last sync time");
        None
      }
    };

    Self::new(SyncStatus {
      online,
      last_sync,
      in_progress: false,
      pending,
    })
  }

  pub fn snapshot(&self) -> SyncStatus {
    self.tx.borrow().clone()
  }

  pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
    self.tx.subscribe()
  }

  pub fn set_online(&self, online: bool) {
    self.update(|s| s.online = online);
  }

  pub fn set_in_progress(&self, in_progress: bool) {
    self.update(|s| s.in_progress = in_progress);
  }

  pub fn record_sync(&self, at: DateTime<Utc>) {
    self.update(|s| s.last_sync = Some(at));
  }

  /// Re-read the pending count from the queue.
  pub async fn refresh_pending(&self, queue: &dyn DurableQueue) {
    let pending = match queue.count().await {
      Ok(n) => n,
      Err(e) => {
        tracing::error!(error = %e, "failed to count pending entries, assuming empty");
        0
      }
    };
    self.update(|s| s.pending = pending);
  }

  fn update(&self, apply: impl FnOnce(&mut SyncStatus)) {
    self.tx.send_if_modified(|status| {
      let before = status.clone();
      apply(status);
      *status != before
    });
  }
}
