//! Replays pending entries against the network.

use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::queue::DurableQueue;
use super::status::StatusHandle;
use crate::net::Transport;

/// Result of one call to [`Syncer::drain`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
  /// Another drain was in flight; nothing was done
  AlreadyRunning,
  /// The queue was emptied
  Completed { replayed: usize },
  /// A replay failed; the failing entry and everything after it stay queued
  Stopped {
    replayed: usize,
    remaining: usize,
    reason: String,
  },
}

/// How long a drain lease stays valid without renewal. Renewed before every
/// replay, so it only needs to outlast one request.
const LEASE_TTL: Duration = Duration::from_secs(60);

/// Drains the pending-sync queue, oldest entry first.
///
/// At most one drain runs at a time per `Syncer` (and its clones), and the
/// queue's drain lease keeps other processes sharing the same store out
/// while a pass runs. The first failed replay ends the pass; later entries
/// are never attempted ahead of an earlier one.
#[derive(Clone)]
pub struct Syncer {
  queue: Arc<dyn DurableQueue>,
  transport: Arc<dyn Transport>,
  status: StatusHandle,
  running: Arc<AtomicBool>,
  passes: Arc<AtomicUsize>,
  owner: Arc<str>,
}

/// Clears the running flag and the in-progress status when a pass ends.
struct PassGuard<'a> {
  running: &'a AtomicBool,
  status: &'a StatusHandle,
}

impl Drop for PassGuard<'_> {
  fn drop(&mut self) {
    self.status.set_in_progress(false);
    self.running.store(false, Ordering::SeqCst);
  }
}

impl Syncer {
  pub fn new(queue: Arc<dyn DurableQueue>, transport: Arc<dyn Transport>, status: StatusHandle) -> Self {
    Self {
      queue,
      transport,
      status,
      running: Arc::new(AtomicBool::new(false)),
      passes: Arc::new(AtomicUsize::new(0)),
      owner: Arc::from(format!(
        "{}-{}",
        std::process::id(),
        Utc::now().timestamp_nanos_opt().unwrap_or_default()
      )),
    }
  }

  pub fn queue(&self) -> &Arc<dyn DurableQueue> {
    &self.queue
  }

  pub fn status(&self) -> &StatusHandle {
    &self.status
  }

  pub fn is_running(&self) -> bool {
    self.running.load(Ordering::SeqCst)
  }

  /// Number of drain passes started so far.
  pub fn passes(&self) -> usize {
    self.passes.load(Ordering::SeqCst)
  }

  /// Replay pending entries until the queue is empty or a replay fails.
  pub async fn drain(&self) -> DrainOutcome {
    if self
      .running
      .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
      .is_err()
    {
      tracing::debug!("drain already in progress, skipping");
      return DrainOutcome::AlreadyRunning;
    }

    let _guard = PassGuard {
      running: &self.running,
      status: &self.status,
    };

    match self.queue.claim_drain(&self.owner, LEASE_TTL).await {
      Ok(true) => {}
      Ok(false) => {
        tracing::debug!("another process is draining, skipping");
        return DrainOutcome::AlreadyRunning;
      }
      Err(e) => {
        tracing::error!(error = %e, "failed to claim drain lease, treating queue as empty");
        return DrainOutcome::Completed { replayed: 0 };
      }
    }

    self.passes.fetch_add(1, Ordering::SeqCst);
    self.status.set_in_progress(true);

    let outcome = self.replay_pending().await;
    if let Err(e) = self.queue.release_drain(&self.owner).await {
      tracing::warn!(error = %e, "failed to release drain lease");
    }
    match &outcome {
      DrainOutcome::Completed { replayed } => {
        tracing::info!(replayed, "pending queue drained");
      }
      DrainOutcome::Stopped {
        replayed,
        remaining,
        reason,
      } => {
        tracing::warn!(replayed, remaining, %reason, "drain stopped at failing entry");
      }
      DrainOutcome::AlreadyRunning => {}
    }
    outcome
  }

  async fn replay_pending(&self) -> DrainOutcome {
    let mut replayed = 0;

    loop {
      let entry = match self.queue.front().await {
        Ok(Some(entry)) => entry,
        Ok(None) => break,
        Err(e) => {
          // Nothing was read, so this is not a successful sync
          tracing::error!(error = %e, "failed to read pending queue, treating as empty");
          self.status.refresh_pending(self.queue.as_ref()).await;
          return DrainOutcome::Completed { replayed };
        }
      };

      match self.queue.claim_drain(&self.owner, LEASE_TTL).await {
        Ok(true) => {}
        Ok(false) => {
          let reason = "drain lease taken over by another process".to_string();
          return self.stopped(replayed, reason).await;
        }
        Err(e) => {
          tracing::error!(error = %e, "failed to renew drain lease, treating queue as empty");
          self.status.refresh_pending(self.queue.as_ref()).await;
          return DrainOutcome::Completed { replayed };
        }
      }

      tracing::debug!(
        id = %entry.id,
        method = %entry.request.method,
        url = %entry.request.url,
        "replaying pending entry"
      );

      let failure = match self.transport.send(&entry.request).await {
        Ok(response) if response.is_success() => None,
        Ok(response) => Some(format!("HTTP {}", response.status)),
        Err(e) => Some(e.to_string()),
      };

      if let Some(reason) = failure {
        return self.stopped(replayed, reason).await;
      }

      if let Err(e) = self.queue.remove(&entry.id).await {
        let reason = format!("replayed {} but could not remove it: {}", entry.id, e);
        return self.stopped(replayed, reason).await;
      }
      replayed += 1;
      self.status.refresh_pending(self.queue.as_ref()).await;
    }

    let now = Utc::now();
    if let Err(e) = self.queue.record_sync(now).await {
      tracing::warn!(error = %e, "failed to persist last sync time");
    }
    self.status.record_sync(now);
    self.status.refresh_pending(self.queue.as_ref()).await;

    DrainOutcome::Completed { replayed }
  }

  async fn stopped(&self, replayed: usize, reason: String) -> DrainOutcome {
    self.status.refresh_pending(self.queue.as_ref()).await;
    DrainOutcome::Stopped {
      replayed,
      remaining: self.status.snapshot().pending,
      reason,
    }
  }
}
