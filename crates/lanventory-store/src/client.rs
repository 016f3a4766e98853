//! SQLite connection management and the shared inventory handle.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Deserialize;

use crate::schema;

/// Errors from inventory store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Host not found: {0}")]
    HostNotFound(String),

    #[error("Inventory connection lock poisoned")]
    Poisoned,
}

/// Configuration for opening the inventory database.
///
/// Loaded from the `[store]` section of `lanventory.toml` or
/// `LANVENTORY_STORE__` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Path of the SQLite database file (default: "lanventory.db").
    #[serde(default = "default_path")]
    pub path: String,

    /// How long a writer waits on a locked database before failing.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_path() -> String {
    "lanventory.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

/// Thread-safe handle to the live inventory.
///
/// This is the single point of access for the hosts, ports and history
/// tables. Clone is cheap (inner Arc).
#[derive(Clone)]
pub struct InventoryDb {
    conn: Arc<Mutex<Connection>>,
}

impl InventoryDb {
    /// Open (or create) the database file and bootstrap the schema.
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let conn = Connection::open(Path::new(&config.path))?;
        conn.busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        let db = Self::from_connection(conn)?;
        tracing::info!(path = %config.path, journal_mode = %mode, "Opened inventory database");
        Ok(db)
    }

    /// Open a private in-memory inventory. Used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Run `f` inside a single SQLite transaction.
    ///
    /// The transaction commits only when `f` returns `Ok`. Any error, or a
    /// panic inside `f`, rolls every write back.
    pub fn transaction<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&InventoryTxn<'_>) -> Result<T, StoreError>,
    {
        let mut conn = self.lock()?;
        let txn = InventoryTxn {
            tx: conn.transaction()?,
        };
        let value = f(&txn)?;
        txn.tx.commit()?;
        Ok(value)
    }
}

/// An open write transaction over the inventory tables.
///
/// Operations on this type are only visible to other readers once the
/// enclosing [`InventoryDb::transaction`] commits.
pub struct InventoryTxn<'conn> {
    pub(crate) tx: rusqlite::Transaction<'conn>,
}

// ── Timestamp Helpers ────────────────────────────────────────────

pub(crate) fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub(crate) fn from_millis(idx: usize, ms: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, ms))
}
