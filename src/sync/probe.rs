//! Periodic reachability check against the API health endpoint.

use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::observer::{Connectivity, ObserverHandle};
use crate::net::{RequestDescriptor, Transport};

/// Hit the health endpoint once. Anything but a 2xx counts as offline.
pub async fn reachable(transport: &dyn Transport, health: &RequestDescriptor) -> Connectivity {
  match transport.send(health).await {
    Ok(response) => Connectivity::from_online(response.is_success()),
    Err(e) => {
      tracing::debug!(error = %e, "health check failed");
      Connectivity::Offline
    }
  }
}

pub struct ConnectivityProbe {
  transport: Arc<dyn Transport>,
  health: RequestDescriptor,
  interval: Duration,
  observer: ObserverHandle,
}

impl ConnectivityProbe {
  pub fn new(
    transport: Arc<dyn Transport>,
    health_url: Url,
    interval: Duration,
    observer: ObserverHandle,
  ) -> Self {
    Self {
      transport,
      health: RequestDescriptor::get(health_url),
      interval,
      observer,
    }
  }

  /// Probe once and report the result to the observer.
  pub async fn check(&self) -> Connectivity {
    let connectivity = reachable(self.transport.as_ref(), &self.health).await;
    self.observer.report(connectivity);
    connectivity
  }

  /// Probe forever at the configured interval.
  pub async fn run(self) {
    let mut ticker = tokio::time::interval(self.interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
      ticker.tick().await;
      self.check().await;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::net::mock::MockTransport;
  use crate::net::{HttpResponse, Method};
  use crate::sync::{ConnectivityObserver, MemoryQueue, StatusHandle, SyncStatus, Syncer};

  fn probe(transport: Arc<MockTransport>) -> (ConnectivityProbe, StatusHandle) {
    let status = StatusHandle::new(SyncStatus::default());
    let syncer = Syncer::new(Arc::new(MemoryQueue::new()), transport.clone(), status.clone());
    let (observer, handle) = ConnectivityObserver::new(syncer, Connectivity::Offline);
    tokio::spawn(observer.run());

    let url = Url::parse("http://localhost:3001/health").unwrap();
    (
      ConnectivityProbe::new(transport, url, Duration::from_millis(10), handle),
      status,
    )
  }

  #[tokio::test]
  async fn test_healthy_endpoint_reports_online() {
    let transport = Arc::new(MockTransport::online());
    transport.route(Method::Get, "/health", HttpResponse::json(200, r#"{"status":"OK"}"#));
    let (probe, status) = probe(transport);

    assert_eq!(probe.check().await, Connectivity::Online);
    let mut rx = status.subscribe();
    tokio::time::timeout(Duration::from_secs(1), rx.wait_for(|s| s.online))
      .await
      .unwrap()
      .unwrap();
  }

  #[tokio::test]
  async fn test_unreachable_or_erroring_endpoint_reports_offline() {
    let transport = Arc::new(MockTransport::offline());
    let (probe, _status) = probe(transport.clone());
    assert_eq!(probe.check().await, Connectivity::Offline);

    transport.set_online(true);
    transport.route(Method::Get, "/health", HttpResponse::json(502, ""));
    assert_eq!(probe.check().await, Connectivity::Offline);
  }
}
