//! Sends mutations, queueing them when the network is unreachable.

use std::sync::Arc;

use super::entry::EntryId;
use super::queue::DurableQueue;
use super::status::StatusHandle;
use crate::net::{HttpResponse, RequestDescriptor, Transport};

/// What happened to a mutation handed to [`OfflineWriter::send`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
  /// Delivered and accepted (2xx)
  Applied(HttpResponse),
  /// Delivered but refused by the server; not queued
  Rejected(HttpResponse),
  /// Network unreachable; stored for later replay
  Queued(EntryId),
  /// Network unreachable and the durable store failed too
  Dropped(String),
}

#[derive(Clone)]
pub struct OfflineWriter {
  transport: Arc<dyn Transport>,
  queue: Arc<dyn DurableQueue>,
  status: StatusHandle,
}

impl OfflineWriter {
  pub fn new(transport: Arc<dyn Transport>, queue: Arc<dyn DurableQueue>, status: StatusHandle) -> Self {
    Self {
      transport,
      queue,
      status,
    }
  }

  pub async fn send(&self, request: RequestDescriptor) -> WriteOutcome {
    match self.transport.send(&request).await {
      Ok(response) if response.is_success() => WriteOutcome::Applied(response),
      Ok(response) => {
        tracing::warn!(
          method = %request.method,
          url = %request.url,
          status = response.status,
          "mutation rejected by server"
        );
        WriteOutcome::Rejected(response)
      }
      Err(e) => {
        tracing::info!(method = %request.method, url = %request.url, error = %e, "network unavailable, queueing mutation");
        self.enqueue(request).await
      }
    }
  }

  /// Store a mutation without attempting delivery.
  pub async fn enqueue(&self, request: RequestDescriptor) -> WriteOutcome {
    let outcome = match self.queue.enqueue(request).await {
      Ok(entry) => WriteOutcome::Queued(entry.id),
      Err(e) => {
        tracing::error!(error = %e, "failed to persist pending mutation");
        WriteOutcome::Dropped(e.to_string())
      }
    };
    self.status.refresh_pending(self.queue.as_ref()).await;
    outcome
  }
}
