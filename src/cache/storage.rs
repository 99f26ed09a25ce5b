//! Response storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::params;
use sha2::{Digest, Sha256};

use super::traits::CachedResponse;
use crate::db::Database;
use crate::net::{Headers, HttpResponse, RequestDescriptor};

/// Trait for response cache backends.
pub trait ResponseStore: Send + Sync {
  /// Store (or overwrite) the response for a request in a partition.
  fn put(&self, partition: &str, request: &RequestDescriptor, response: &HttpResponse) -> Result<()>;

  /// Find a cached response, searching partitions in the given order.
  fn lookup(&self, partitions: &[&str], request: &RequestDescriptor) -> Result<Option<CachedResponse>>;

  /// Names of every partition that holds at least one entry.
  fn partitions(&self) -> Result<Vec<String>>;

  /// Drop a whole partition. Returns the number of entries removed.
  fn delete_partition(&self, partition: &str) -> Result<usize>;
}

impl<T: ResponseStore + ?Sized> ResponseStore for Box<T> {
  fn put(&self, partition: &str, request: &RequestDescriptor, response: &HttpResponse) -> Result<()> {
    (**self).put(partition, request, response)
  }

  fn lookup(&self, partitions: &[&str], request: &RequestDescriptor) -> Result<Option<CachedResponse>> {
    (**self).lookup(partitions, request)
  }

  fn partitions(&self) -> Result<Vec<String>> {
    (**self).partitions()
  }

  fn delete_partition(&self, partition: &str) -> Result<usize> {
    (**self).delete_partition(partition)
  }
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStorage;

impl ResponseStore for NoopStorage {
  fn put(&self, _partition: &str, _request: &RequestDescriptor, _response: &HttpResponse) -> Result<()> {
    Ok(()) // Discard
  }

  fn lookup(&self, _partitions: &[&str], _request: &RequestDescriptor) -> Result<Option<CachedResponse>> {
    Ok(None) // Always miss
  }

  fn partitions(&self) -> Result<Vec<String>> {
    Ok(Vec::new())
  }

  fn delete_partition(&self, _partition: &str) -> Result<usize> {
    Ok(0)
  }
}

/// SQLite-based response storage.
#[derive(Clone)]
pub struct SqliteStorage {
  db: Database,
}

impl SqliteStorage {
  pub fn new(db: Database) -> Self {
    Self { db }
  }
}

/// Stable key for a request: SHA256 over method and full URL.
pub fn request_key(request: &RequestDescriptor) -> String {
  let mut hasher = Sha256::new();
  hasher.update(request.method.as_str().as_bytes());
  hasher.update(b" ");
  hasher.update(request.url.as_str().as_bytes());
  hex::encode(hasher.finalize())
}

impl ResponseStore for SqliteStorage {
  fn put(&self, partition: &str, request: &RequestDescriptor, response: &HttpResponse) -> Result<()> {
    let conn = self.db.conn()?;
    let headers = serde_json::to_string(&response.headers)
      .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO cached_responses
           (partition, request_key, method, url, status, headers, body, cached_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        params![
          partition,
          request_key(request),
          request.method.as_str(),
          request.url.as_str(),
          response.status,
          headers,
          response.body,
          Utc::now().to_rfc3339(),
        ],
      )
      .map_err(|e| eyre!("Failed to store response: {}", e))?;

    Ok(())
  }

  fn lookup(&self, partitions: &[&str], request: &RequestDescriptor) -> Result<Option<CachedResponse>> {
    let conn = self.db.conn()?;
    let key = request_key(request);

    let mut stmt = conn
      .prepare(
        "SELECT status, headers, body, cached_at FROM cached_responses
         WHERE partition = ? AND request_key = ?",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    for partition in partitions {
      let row: Option<(u16, String, Vec<u8>, String)> = stmt
        .query_row(params![partition, key], |row| {
          Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })
        .ok();

      if let Some((status, headers, body, cached_at)) = row {
        let headers: Headers = serde_json::from_str(&headers)
          .map_err(|e| eyre!("Failed to deserialize cached headers: {}", e))?;
        return Ok(Some(CachedResponse {
          response: HttpResponse {
            status,
            headers,
            body,
          },
          cached_at: parse_datetime(&cached_at)?,
        }));
      }
    }

    Ok(None)
  }

  fn partitions(&self) -> Result<Vec<String>> {
    let conn = self.db.conn()?;
    let mut stmt = conn
      .prepare("SELECT DISTINCT partition FROM cached_responses ORDER BY partition")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list partitions: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(names)
  }

  fn delete_partition(&self, partition: &str) -> Result<usize> {
    let conn = self.db.conn()?;
    conn
      .execute(
        "DELETE FROM cached_responses WHERE partition = ?",
        params![partition],
      )
      .map_err(|e| eyre!("Failed to delete partition {}: {}", partition, e))
  }
}

/// Parse an RFC 3339 timestamp written by this module.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
