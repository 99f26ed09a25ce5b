//! Core types for the response cache.

use chrono::{DateTime, Utc};

use crate::net::HttpResponse;

/// A response handed back to the caller, with metadata about where it came from.
#[derive(Debug, Clone)]
pub struct Served {
  /// The response itself
  pub response: HttpResponse,
  /// Where the response came from
  pub source: ServeSource,
  /// When the response was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl Served {
  /// A live response straight from the network.
  pub fn from_network(response: HttpResponse) -> Self {
    Self {
      response,
      source: ServeSource::Network,
      cached_at: None,
    }
  }

  /// A previously cached response.
  pub fn from_cache(response: HttpResponse, cached_at: DateTime<Utc>) -> Self {
    Self {
      response,
      source: ServeSource::Cache,
      cached_at: Some(cached_at),
    }
  }

  /// A built-in placeholder used when neither network nor cache can answer.
  pub fn offline_default(response: HttpResponse) -> Self {
    Self {
      response,
      source: ServeSource::OfflineDefault,
      cached_at: None,
    }
  }

  /// The failure indicator for endpoints without a sensible default.
  pub fn unavailable(response: HttpResponse) -> Self {
    Self {
      response,
      source: ServeSource::Unavailable,
      cached_at: None,
    }
  }

  /// True when the network could not be reached for this response.
  pub fn is_offline(&self) -> bool {
    !matches!(self.source, ServeSource::Network)
  }
}

/// Indicates where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeSource {
  /// Fresh data from network
  Network,
  /// Network unavailable (or static asset hit), serving cached data
  Cache,
  /// Network unavailable and nothing cached, serving a zero/empty placeholder
  OfflineDefault,
  /// Network unavailable, nothing cached and no placeholder exists (503)
  Unavailable,
}

/// A response stored in a cache partition.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  pub response: HttpResponse,
  pub cached_at: DateTime<Utc>,
}

/// The two recognized partition names for one cache version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partitions {
  pub static_name: String,
  pub dynamic_name: String,
}

impl Partitions {
  pub fn for_version(version: &str) -> Self {
    Self {
      static_name: format!("static-{}", version),
      dynamic_name: format!("dynamic-{}", version),
    }
  }

  /// Lookup order: static first, then dynamic.
  pub fn names(&self) -> [&str; 2] {
    [&self.static_name, &self.dynamic_name]
  }

  pub fn is_current(&self, name: &str) -> bool {
    name == self.static_name || name == self.dynamic_name
  }
}
