//! Network transport abstraction and the reqwest implementation.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::time::Duration;
use thiserror::Error;

use super::types::{Headers, HttpResponse, RequestDescriptor};

/// Failure to obtain any HTTP response at all.
///
/// An HTTP error status is not a transport error: it arrives as an
/// [`HttpResponse`] and callers decide what it means.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
  #[error("network unreachable: {0}")]
  Unreachable(String),
  #[error("invalid request: {0}")]
  Invalid(String),
}

/// Sends request descriptors over the network.
#[async_trait]
pub trait Transport: Send + Sync {
  async fn send(&self, request: &RequestDescriptor) -> Result<HttpResponse, TransportError>;
}

/// Transport backed by a shared reqwest client.
#[derive(Clone)]
pub struct ReqwestTransport {
  client: reqwest::Client,
}

impl ReqwestTransport {
  pub fn new(timeout: Duration) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

#[async_trait]
impl Transport for ReqwestTransport {
  async fn send(&self, request: &RequestDescriptor) -> Result<HttpResponse, TransportError> {
    let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
      .map_err(|e| TransportError::Invalid(format!("bad method {}: {}", request.method, e)))?;

    let mut builder = self.client.request(method, request.url.clone());
    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(body) = &request.body {
      builder = builder.body(body.clone());
    }

    let response = builder.send().await.map_err(|e| {
      if e.is_builder() {
        TransportError::Invalid(e.to_string())
      } else {
        TransportError::Unreachable(e.to_string())
      }
    })?;

    let status = response.status().as_u16();
    let headers: Headers = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();

    let body = response
      .bytes()
      .await
      .map_err(|e| TransportError::Unreachable(format!("failed to read body: {}", e)))?;

    Ok(HttpResponse {
      status,
      headers,
      body: body.to_vec(),
    })
  }
}
