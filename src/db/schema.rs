/// Schema for the offline database.
pub const SCHEMA: &str = r#"
-- Cached GET responses, one row per (partition, request key)
CREATE TABLE IF NOT EXISTS cached_responses (
    partition TEXT NOT NULL,
    request_key TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (partition, request_key)
);

CREATE INDEX IF NOT EXISTS idx_cached_responses_key
    ON cached_responses(request_key);

-- Mutations waiting to be replayed; seq preserves enqueue order
CREATE TABLE IF NOT EXISTS pending_sync (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    headers TEXT NOT NULL,
    body TEXT,
    enqueued_at TEXT NOT NULL
);

-- Small key/value table (last successful sync time)
CREATE TABLE IF NOT EXISTS sync_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;
