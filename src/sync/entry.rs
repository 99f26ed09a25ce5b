use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::net::RequestDescriptor;

static SEQUENCE: AtomicU32 = AtomicU32::new(0);

/// Identifier of a pending entry: `<epoch millis>-<pid>-<sequence>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
  /// Derive an id from the creation time. The process id separates
  /// processes sharing one store; the sequence separates entries created
  /// within the same millisecond.
  pub fn generate(created_at: DateTime<Utc>) -> Self {
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed) % 10_000;
    Self::compose(created_at, std::process::id(), seq)
  }

  fn compose(created_at: DateTime<Utc>, pid: u32, seq: u32) -> Self {
    Self(format!("{}-{}-{:04}", created_at.timestamp_millis(), pid, seq))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl From<String> for EntryId {
  fn from(s: String) -> Self {
    Self(s)
  }
}

impl fmt::Display for EntryId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// A mutation that could not be delivered and waits for replay.
///
/// Entries are never modified after creation; a successful replay deletes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSyncEntry {
  pub id: EntryId,
  pub request: RequestDescriptor,
  pub enqueued_at: DateTime<Utc>,
}

impl PendingSyncEntry {
  pub fn new(request: RequestDescriptor) -> Self {
    let enqueued_at = Utc::now();
    Self {
      id: EntryId::generate(enqueued_at),
      request,
      enqueued_at,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_ids_are_unique_within_one_millisecond() {
    let now = Utc::now();
    let a = EntryId::generate(now);
    let b = EntryId::generate(now);
    assert_ne!(a, b);
    assert!(a.as_str().starts_with(&now.timestamp_millis().to_string()));
    assert!(a.as_str().contains(&format!("-{}-", std::process::id())));
  }

  #[test]
  fn test_ids_differ_across_processes_with_the_same_counter() {
    let now = Utc::now();
    let first_cli = EntryId::compose(now, 4100, 0);
    let second_cli = EntryId::compose(now, 4101, 0);
    assert_ne!(first_cli, second_cli);
    assert_eq!(
      first_cli.as_str(),
      format!("{}-4100-0000", now.timestamp_millis())
    );
  }
}
