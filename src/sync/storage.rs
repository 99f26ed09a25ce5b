//! SQLite-backed durable queue.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};
use std::sync::MutexGuard;
use std::time::Duration;
use url::Url;

use super::entry::{EntryId, PendingSyncEntry};
use super::queue::{DurableQueue, StoreError};
use crate::db::Database;
use crate::net::{Headers, RequestDescriptor};

const LAST_SYNC_KEY: &str = "last_sync";
const DRAIN_LEASE_KEY: &str = "drain_lease";

/// Pending-sync queue persisted in the offline database.
#[derive(Clone)]
pub struct SqliteQueue {
  db: Database,
}

impl SqliteQueue {
  pub fn new(db: Database) -> Self {
    Self { db }
  }

  fn conn(&self) -> Result<MutexGuard<'_, rusqlite::Connection>, StoreError> {
    self
      .db
      .conn()
      .map_err(|e| StoreError::Backend(e.to_string()))
  }
}

/// Lease rows are stored as `<owner>|<expiry rfc3339>`.
fn parse_lease(value: &str) -> Option<(&str, DateTime<Utc>)> {
  let (owner, expires) = value.split_once('|')?;
  let expires = DateTime::parse_from_rfc3339(expires).ok()?;
  Some((owner, expires.with_timezone(&Utc)))
}

const SELECT_ENTRY: &str = "SELECT id, method, url, headers, body, enqueued_at FROM pending_sync";

type RawEntry = (String, String, String, String, Option<String>, String);

fn read_row(row: &Row<'_>) -> rusqlite::Result<RawEntry> {
  Ok((
    row.get(0)?,
    row.get(1)?,
    row.get(2)?,
    row.get(3)?,
    row.get(4)?,
    row.get(5)?,
  ))
}

fn decode((id, method, url, headers, body, enqueued_at): RawEntry) -> Result<PendingSyncEntry, StoreError> {
  let url = Url::parse(&url)
    .map_err(|e| StoreError::Backend(format!("stored url '{}' is invalid: {}", url, e)))?;
  let headers: Headers = serde_json::from_str(&headers)?;
  let enqueued_at = DateTime::parse_from_rfc3339(&enqueued_at)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| StoreError::Backend(format!("bad timestamp '{}': {}", enqueued_at, e)))?;

  Ok(PendingSyncEntry {
    id: EntryId::from(id),
    request: RequestDescriptor {
      method: method.into(),
      url,
      headers,
      body,
    },
    enqueued_at,
  })
}

#[async_trait]
impl DurableQueue for SqliteQueue {
  async fn enqueue(&self, request: RequestDescriptor) -> Result<PendingSyncEntry, StoreError> {
    let entry = PendingSyncEntry::new(request);
    let headers = serde_json::to_string(&entry.request.headers)?;

    self.conn()?.execute(
      "INSERT INTO pending_sync (id, method, url, headers, body, enqueued_at)
       VALUES (?, ?, ?, ?, ?, ?)",
      params![
        entry.id.as_str(),
        entry.request.method.as_str(),
        entry.request.url.as_str(),
        headers,
        entry.request.body,
        entry.enqueued_at.to_rfc3339(),
      ],
    )?;

    Ok(entry)
  }

  async fn front(&self) -> Result<Option<PendingSyncEntry>, StoreError> {
    let raw = self
      .conn()?
      .query_row(&format!("{} ORDER BY seq LIMIT 1", SELECT_ENTRY), [], read_row)
      .optional()?;

    raw.map(decode).transpose()
  }

  async fn entries(&self) -> Result<Vec<PendingSyncEntry>, StoreError> {
    let conn = self.conn()?;
    let mut stmt = conn.prepare(&format!("{} ORDER BY seq", SELECT_ENTRY))?;
    let rows = stmt
      .query_map([], read_row)?
      .collect::<rusqlite::Result<Vec<_>>>()?;

    rows.into_iter().map(decode).collect()
  }

  async fn remove(&self, id: &EntryId) -> Result<(), StoreError> {
    let deleted = self
      .conn()?
      .execute("DELETE FROM pending_sync WHERE id = ?", params![id.as_str()])?;

    if deleted == 0 {
      return Err(StoreError::NotFound(id.clone()));
    }
    Ok(())
  }

  async fn count(&self) -> Result<usize, StoreError> {
    let count: i64 = self
      .conn()?
      .query_row("SELECT COUNT(*) FROM pending_sync", [], |row| row.get(0))?;
    Ok(count as usize)
  }

  async fn last_synced_at(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
    let value: Option<String> = self
      .conn()?
      .query_row(
        "SELECT value FROM sync_meta WHERE key = ?",
        params![LAST_SYNC_KEY],
        |row| row.get(0),
      )
      .optional()?;

    value
      .map(|v| {
        DateTime::parse_from_rfc3339(&v)
          .map(|dt| dt.with_timezone(&Utc))
          .map_err(|e| StoreError::Backend(format!("bad timestamp '{}': {}", v, e)))
      })
      .transpose()
  }

  async fn record_sync(&self, at: DateTime<Utc>) -> Result<(), StoreError> {
    self.conn()?.execute(
      "INSERT OR REPLACE INTO sync_meta (key, value) VALUES (?, ?)",
      params![LAST_SYNC_KEY, at.to_rfc3339()],
    )?;
    Ok(())
  }

  async fn claim_drain(&self, owner: &str, ttl: Duration) -> Result<bool, StoreError> {
    let ttl = chrono::Duration::from_std(ttl)
      .map_err(|e| StoreError::Backend(format!("invalid lease ttl: {}", e)))?;
    let now = Utc::now();

    // IMMEDIATE takes the write lock up front so two processes cannot both
    // see the lease as free
    let mut conn = self.conn()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let held: Option<String> = tx
      .query_row(
        "SELECT value FROM sync_meta WHERE key = ?",
        params![DRAIN_LEASE_KEY],
        |row| row.get(0),
      )
      .optional()?;

    if let Some((holder, expires)) = held.as_deref().and_then(parse_lease) {
      if holder != owner && expires > now {
        tracing::debug!(holder, %expires, "drain lease held by another process");
        return Ok(false);
      }
    }

    tx.execute(
      "INSERT OR REPLACE INTO sync_meta (key, value) VALUES (?, ?)",
      params![DRAIN_LEASE_KEY, format!("{}|{}", owner, (now + ttl).to_rfc3339())],
    )?;
    tx.commit()?;
    Ok(true)
  }

  async fn release_drain(&self, owner: &str) -> Result<(), StoreError> {
    let mut conn = self.conn()?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let held: Option<String> = tx
      .query_row(
        "SELECT value FROM sync_meta WHERE key = ?",
        params![DRAIN_LEASE_KEY],
        |row| row.get(0),
      )
      .optional()?;

    if held.as_deref().and_then(parse_lease).map(|(holder, _)| holder) == Some(owner) {
      tx.execute("DELETE FROM sync_meta WHERE key = ?", params![DRAIN_LEASE_KEY])?;
    }
    tx.commit()?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::net::Method;

  fn post(description: &str) -> RequestDescriptor {
    RequestDescriptor::new(
      Method::Post,
      Url::parse("http://localhost:3001/api/transactions").unwrap(),
    )
    .with_json(format!(r#"{{"description":"{}"}}"#, description))
  }

  #[tokio::test]
  async fn test_entries_come_back_in_enqueue_order() {
    let queue = SqliteQueue::new(Database::open_in_memory().unwrap());
    for d in ["a", "b", "c"] {
      queue.enqueue(post(d)).await.unwrap();
    }

    let bodies: Vec<String> = queue
      .entries()
      .await
      .unwrap()
      .into_iter()
      .filter_map(|e| e.request.body)
      .collect();
    assert_eq!(
      bodies,
      vec![
        r#"{"description":"a"}"#,
        r#"{"description":"b"}"#,
        r#"{"description":"c"}"#
      ]
    );
  }

  #[tokio::test]
  async fn test_entry_fields_survive_storage() {
    let queue = SqliteQueue::new(Database::open_in_memory().unwrap());
    let request = post("Coffee").with_header("X-Client", "spese");
    let stored = queue.enqueue(request.clone()).await.unwrap();

    let loaded = queue.front().await.unwrap().unwrap();
    assert_eq!(loaded.id, stored.id);
    assert_eq!(loaded.request, request);
  }

  #[tokio::test]
  async fn test_remove_and_count() {
    let queue = SqliteQueue::new(Database::open_in_memory().unwrap());
    let first = queue.enqueue(post("a")).await.unwrap();
    queue.enqueue(post("b")).await.unwrap();

    queue.remove(&first.id).await.unwrap();
    assert_eq!(queue.count().await.unwrap(), 1);
    assert!(matches!(
      queue.remove(&first.id).await,
      Err(StoreError::NotFound(_))
    ));
  }

  #[tokio::test]
  async fn test_last_sync_roundtrip() {
    let queue = SqliteQueue::new(Database::open_in_memory().unwrap());
    assert!(queue.last_synced_at().await.unwrap().is_none());

    let at = Utc::now();
    queue.record_sync(at).await.unwrap();
    let loaded = queue.last_synced_at().await.unwrap().unwrap();
    assert_eq!(loaded.timestamp_millis(), at.timestamp_millis());
  }

  #[tokio::test]
  async fn test_drain_lease_is_exclusive_until_released_or_expired() {
    let queue = SqliteQueue::new(Database::open_in_memory().unwrap());
    let ttl = Duration::from_secs(60);

    assert!(queue.claim_drain("watch", ttl).await.unwrap());
    assert!(!queue.claim_drain("sync", ttl).await.unwrap());
    // Renewal by the holder
    assert!(queue.claim_drain("watch", ttl).await.unwrap());

    // Releasing someone else's lease is a no-op
    queue.release_drain("sync").await.unwrap();
    assert!(!queue.claim_drain("sync", ttl).await.unwrap());

    queue.release_drain("watch").await.unwrap();
    assert!(queue.claim_drain("sync", Duration::ZERO).await.unwrap());
    // A zero-length lease is already expired
    assert!(queue.claim_drain("watch", ttl).await.unwrap());
  }

  #[tokio::test]
  async fn test_entries_survive_reopening_the_database() {
    let path = std::env::temp_dir().join(format!(
      "spese-sync-queue-{}-{}.db",
      std::process::id(),
      Utc::now().timestamp_nanos_opt().unwrap_or_default()
    ));

    {
      let queue = SqliteQueue::new(Database::open(Some(&path)).unwrap());
      queue.enqueue(post("persisted")).await.unwrap();
    }

    let reopened = SqliteQueue::new(Database::open(Some(&path)).unwrap());
    assert_eq!(reopened.count().await.unwrap(), 1);
    assert_eq!(
      reopened.front().await.unwrap().unwrap().request.body.as_deref(),
      Some(r#"{"description":"persisted"}"#)
    );

    drop(reopened);
    let _ = std::fs::remove_file(&path);
  }
}
