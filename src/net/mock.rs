//! Scriptable in-process transport used by tests.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::transport::{Transport, TransportError};
use super::types::{HttpResponse, Method, RequestDescriptor};

/// Transport that answers from canned routes and records every call.
///
/// Resolution order for each call: scripted outcomes (FIFO), then the
/// online flag, then registered routes, then `200 {}`.
pub struct MockTransport {
  online: AtomicBool,
  delay: Duration,
  routes: Mutex<HashMap<(Method, String), HttpResponse>>,
  script: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
  calls: Mutex<Vec<RequestDescriptor>>,
}

impl MockTransport {
  pub fn online() -> Self {
    Self {
      online: AtomicBool::new(true),
      delay: Duration::ZERO,
      routes: Mutex::new(HashMap::new()),
      script: Mutex::new(VecDeque::new()),
      calls: Mutex::new(Vec::new()),
    }
  }

  pub fn offline() -> Self {
    let transport = Self::online();
    transport.set_online(false);
    transport
  }

  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = delay;
    self
  }

  pub fn set_online(&self, online: bool) {
    self.online.store(online, Ordering::SeqCst);
  }

  /// Register a response for `method` + path (including `?query` when present).
  pub fn route(&self, method: Method, path: &str, response: HttpResponse) {
    self
      .routes
      .lock()
      .unwrap()
      .insert((method, path.to_string()), response);
  }

  /// Queue a one-shot outcome consumed by the next call.
  pub fn push_outcome(&self, outcome: Result<HttpResponse, TransportError>) {
    self.script.lock().unwrap().push_back(outcome);
  }

  pub fn calls(&self) -> Vec<RequestDescriptor> {
    self.calls.lock().unwrap().clone()
  }

  pub fn call_count(&self) -> usize {
    self.calls.lock().unwrap().len()
  }
}

fn route_key(request: &RequestDescriptor) -> String {
  match request.url.query() {
    Some(q) => format!("{}?{}", request.url.path(), q),
    None => request.url.path().to_string(),
  }
}

#[async_trait]
impl Transport for MockTransport {
  async fn send(&self, request: &RequestDescriptor) -> Result<HttpResponse, TransportError> {
    self.calls.lock().unwrap().push(request.clone());

    if !self.delay.is_zero() {
      tokio::time::sleep(self.delay).await;
    }

    if let Some(outcome) = self.script.lock().unwrap().pop_front() {
      return outcome;
    }

    if !self.online.load(Ordering::SeqCst) {
      return Err(TransportError::Unreachable("mock transport offline".into()));
    }

    let key = (request.method.clone(), route_key(request));
    Ok(
      self
        .routes
        .lock()
        .unwrap()
        .get(&key)
        .cloned()
        .unwrap_or_else(|| HttpResponse::json(200, "{}")),
    )
  }
}
