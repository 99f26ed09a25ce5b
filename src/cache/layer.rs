//! Cache manager that sits between callers and the network.

use color_eyre::{eyre::eyre, Result};
use futures::future::join_all;
use std::sync::Arc;
use url::Url;

use super::defaults::offline_default;
use super::storage::ResponseStore;
use super::traits::{CachedResponse, Partitions, Served};
use crate::net::{HttpResponse, RequestDescriptor, Transport, TransportError};

/// Intercepts reads and answers them from network or cache.
///
/// API reads (`/api/...`) go network first and fall back to the cache or a
/// built-in default. Everything else is treated as a static asset and served
/// cache first.
pub struct CacheManager<S: ResponseStore> {
  storage: Arc<S>,
  transport: Arc<dyn Transport>,
  partitions: Partitions,
  base_url: Url,
  static_assets: Vec<String>,
}

impl<S: ResponseStore> CacheManager<S> {
  pub fn new(storage: S, transport: Arc<dyn Transport>, base_url: Url, version: &str) -> Self {
    Self {
      storage: Arc::new(storage),
      transport,
      partitions: Partitions::for_version(version),
      base_url,
      static_assets: Vec::new(),
    }
  }

  /// Set the asset paths precached by [`CacheManager::install`].
  pub fn with_static_assets(mut self, assets: Vec<String>) -> Self {
    self.static_assets = assets;
    self
  }

  pub fn partitions(&self) -> &Partitions {
    &self.partitions
  }

  /// Precache the app shell into the static partition.
  ///
  /// Assets that fail to download are logged and skipped. Returns how many
  /// were stored.
  pub async fn install(&self) -> Result<usize> {
    let requests = self
      .static_assets
      .iter()
      .map(|path| {
        self
          .base_url
          .join(path)
          .map(RequestDescriptor::get)
          .map_err(|e| eyre!("Invalid static asset path {}: {}", path, e))
      })
      .collect::<Result<Vec<_>>>()?;

    let responses = join_all(requests.iter().map(|req| self.transport.send(req))).await;

    let mut cached = 0;
    for (request, result) in requests.iter().zip(responses) {
      match result {
        Ok(response) if response.status == 200 => {
          if self.remember(&self.partitions.static_name, request, &response) {
            cached += 1;
          }
        }
        Ok(response) => {
          tracing::warn!(url = %request.url, status = response.status, "static asset not cached");
        }
        Err(e) => {
          tracing::warn!(url = %request.url, error = %e, "static asset fetch failed");
        }
      }
    }

    tracing::info!(cached, total = requests.len(), "static assets precached");
    Ok(cached)
  }

  /// Delete every partition that does not belong to the current version.
  pub fn activate(&self) -> Result<Vec<String>> {
    let mut evicted = Vec::new();
    for name in self.storage.partitions()? {
      if self.partitions.is_current(&name) {
        continue;
      }
      let removed = self.storage.delete_partition(&name)?;
      tracing::info!(partition = %name, removed, "deleted stale cache partition");
      evicted.push(name);
    }
    Ok(evicted)
  }

  /// Serve a request.
  ///
  /// Non-GET requests are forwarded untouched. A transport error is only
  /// returned for non-GET requests and for static assets missing from cache.
  pub async fn fetch(&self, request: &RequestDescriptor) -> Result<Served, TransportError> {
    if !request.method.is_get() {
      return self.transport.send(request).await.map(Served::from_network);
    }

    if request.path().starts_with("/api/") {
      Ok(self.fetch_api(request).await)
    } else {
      self.fetch_static(request).await
    }
  }

  /// Network first, then cache, then the endpoint default.
  async fn fetch_api(&self, request: &RequestDescriptor) -> Served {
    match self.transport.send(request).await {
      Ok(response) => {
        if response.status == 200 {
          self.remember(&self.partitions.dynamic_name, request, &response);
        }
        Served::from_network(response)
      }
      Err(e) => {
        tracing::debug!(url = %request.url, error = %e, "network failed, trying cache");
        match self.cached(request) {
          Some(cached) => Served::from_cache(cached.response, cached.cached_at),
          None => offline_default(request.path()),
        }
      }
    }
  }

  /// Cache first, then network (populating the dynamic partition on 200).
  async fn fetch_static(&self, request: &RequestDescriptor) -> Result<Served, TransportError> {
    if let Some(cached) = self.cached(request) {
      return Ok(Served::from_cache(cached.response, cached.cached_at));
    }

    let response = self.transport.send(request).await?;
    if response.status == 200 {
      self.remember(&self.partitions.dynamic_name, request, &response);
    }
    Ok(Served::from_network(response))
  }

  fn cached(&self, request: &RequestDescriptor) -> Option<CachedResponse> {
    match self.storage.lookup(&self.partitions.names(), request) {
      Ok(hit) => hit,
      Err(e) => {
        tracing::warn!(url = %request.url, error = %e, "cache lookup failed");
        None
      }
    }
  }

  /// Write to cache without letting a failure escape. Returns whether it stuck.
  fn remember(&self, partition: &str, request: &RequestDescriptor, response: &HttpResponse) -> bool {
    match self.storage.put(partition, request, response) {
      Ok(()) => true,
      Err(e) => {
        tracing::warn!(partition, url = %request.url, error = %e, "cache write failed");
        false
      }
    }
  }
}

impl<S: ResponseStore> Clone for CacheManager<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      transport: Arc::clone(&self.transport),
      partitions: self.partitions.clone(),
      base_url: self.base_url.clone(),
      static_assets: self.static_assets.clone(),
    }
  }
}
