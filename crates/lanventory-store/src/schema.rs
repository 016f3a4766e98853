use rusqlite::Connection;

use crate::client::StoreError;

pub const MIG_0001_INIT: &str = r#"
BEGIN;

CREATE TABLE hosts (
  id              INTEGER PRIMARY KEY AUTOINCREMENT,
  ip              TEXT NOT NULL UNIQUE,
  mac             TEXT,
  host_name       TEXT,
  name            TEXT NOT NULL CHECK (length(name) > 0),
  hardware        TEXT,
  last_seen_ms    INTEGER NOT NULL,
  known           INTEGER NOT NULL DEFAULT 0 CHECK (known IN (0,1)),
  active          INTEGER NOT NULL DEFAULT 1 CHECK (active IN (0,1))
);

CREATE TABLE ports (
  id              INTEGER PRIMARY KEY AUTOINCREMENT,
  host_id         INTEGER NOT NULL REFERENCES hosts(id),
  port            INTEGER NOT NULL CHECK (port BETWEEN 1 AND 65535),
  protocol        TEXT NOT NULL DEFAULT 'tcp',
  service         TEXT NOT NULL DEFAULT '',
  description     TEXT NOT NULL DEFAULT '',
  last_seen_ms    INTEGER NOT NULL,
  UNIQUE (host_id, port, protocol)
);

CREATE TABLE history (
  id              INTEGER PRIMARY KEY AUTOINCREMENT,
  host_id         INTEGER NOT NULL,
  ip              TEXT NOT NULL,
  mac             TEXT,
  host_name       TEXT,
  name            TEXT NOT NULL,
  hardware        TEXT,
  last_seen_ms    INTEGER NOT NULL,
  known           INTEGER NOT NULL,
  active          INTEGER NOT NULL,
  archived_at_ms  INTEGER NOT NULL
);

CREATE INDEX idx_ports_host ON ports(host_id);
CREATE INDEX idx_hosts_lifecycle ON hosts(known, active);
CREATE INDEX idx_history_ip ON history(ip);

COMMIT;
"#;

/// Apply the initial schema when the inventory tables do not exist yet.
pub(crate) fn migrate(conn: &Connection) -> Result<(), StoreError> {
    let exists: i64 = conn.query_row(
        "SELECT COUNT(1) FROM sqlite_master WHERE type='table' AND name='hosts'",
        [],
        |r| r.get(0),
    )?;
    if exists == 0 {
        conn.execute_batch(MIG_0001_INIT)?;
        tracing::info!("Applied inventory schema");
    }
    Ok(())
}
