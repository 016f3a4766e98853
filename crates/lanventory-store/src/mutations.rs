//! Write operations for the inventory.
//!
//! Hosts upsert on `ip`, ports upsert on `(host_id, port, protocol)`.
//! Archival primitives live on [`InventoryTxn`] so callers can only use
//! them inside a transaction.

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, OptionalExtension};

use lanventory_core::{display_name, Host, HostId, PortId};

use crate::client::{to_millis, InventoryDb, InventoryTxn, StoreError};
use crate::queries::{host_from_row, HOST_COLUMNS};

/// The fields the reconciler writes for one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostUpsert {
    pub ip: String,
    pub mac: Option<String>,
    pub host_name: Option<String>,
    pub name: String,
    pub hardware: Option<String>,
    pub seen_at: DateTime<Utc>,
}

impl HostUpsert {
    /// Build an upsert, deriving the display name from the hostname.
    /// Blank strings are stored as NULL.
    pub fn new(
        ip: impl Into<String>,
        mac: Option<String>,
        host_name: Option<String>,
        hardware: Option<String>,
        seen_at: DateTime<Utc>,
    ) -> Self {
        let ip = ip.into();
        let host_name = non_blank(host_name);
        let name = display_name(host_name.as_deref(), &ip);
        Self {
            ip,
            mac: non_blank(mac),
            host_name,
            name,
            hardware: non_blank(hardware),
            seen_at,
        }
    }
}

/// The fields the reconciler writes for one port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortUpsert {
    pub port: u16,
    pub protocol: String,
    pub service: String,
    pub description: String,
    pub seen_at: DateTime<Utc>,
}

impl InventoryDb {
    // ── Hosts ────────────────────────────────────────────────────

    /// Insert or update the live host with this ip and return its id.
    ///
    /// New rows start with `known = 0, active = 1`. Existing rows have every
    /// scanned field overwritten and `active` reset to 1; `known` and `id`
    /// are left untouched.
    pub fn upsert_host(&self, host: &HostUpsert) -> Result<HostId, StoreError> {
        let conn = self.lock()?;
        let id: i64 = conn.query_row(
            "INSERT INTO hosts (ip, mac, host_name, name, hardware, last_seen_ms, known, active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 1)
             ON CONFLICT(ip) DO UPDATE SET
               mac = excluded.mac, host_name = excluded.host_name,
               name = excluded.name, hardware = excluded.hardware,
               last_seen_ms = excluded.last_seen_ms, active = 1
             RETURNING id",
            params![
                host.ip,
                host.mac,
                host.host_name,
                host.name,
                host.hardware,
                to_millis(host.seen_at)
            ],
            |r| r.get(0),
        )?;
        Ok(HostId(id))
    }

    /// Set or clear the operator's known flag. Returns the updated host.
    pub fn set_known(&self, ip: &str, known: bool) -> Result<Host, StoreError> {
        let conn = self.lock()?;
        let sql = format!("UPDATE hosts SET known = ?1 WHERE ip = ?2 RETURNING {HOST_COLUMNS}");
        conn.query_row(&sql, params![known, ip], host_from_row)
            .optional()?
            .ok_or_else(|| StoreError::HostNotFound(ip.to_string()))
    }

    // ── Ports ────────────────────────────────────────────────────

    /// Upsert every port of one host in a single transaction.
    ///
    /// On conflict only `service`, `description` and `last_seen` change, so
    /// the same `(host_id, port, protocol)` never produces a second row.
    pub fn upsert_ports(
        &self,
        host_id: HostId,
        ports: &[PortUpsert],
    ) -> Result<Vec<PortId>, StoreError> {
        self.transaction(|txn| {
            let mut stmt = txn.tx.prepare_cached(
                "INSERT INTO ports (host_id, port, protocol, service, description, last_seen_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(host_id, port, protocol) DO UPDATE SET
                   service = excluded.service, description = excluded.description,
                   last_seen_ms = excluded.last_seen_ms
                 RETURNING id",
            )?;

            let mut ids = Vec::with_capacity(ports.len());
            for p in ports {
                let id: i64 = stmt.query_row(
                    params![
                        host_id.0,
                        p.port,
                        p.protocol,
                        p.service,
                        p.description,
                        to_millis(p.seen_at)
                    ],
                    |r| r.get(0),
                )?;
                ids.push(PortId(id));
            }
            Ok(ids)
        })
    }
}

impl InventoryTxn<'_> {
    /// Live hosts whose `last_seen` is older than `cutoff`, known or not.
    pub fn hosts_not_seen_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<Host>, StoreError> {
        let sql = format!("SELECT {HOST_COLUMNS} FROM hosts WHERE last_seen_ms < ?1 ORDER BY id");
        let mut stmt = self.tx.prepare(&sql)?;
        let rows = stmt.query_map(params![to_millis(cutoff)], host_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Clear the `active` flag on the given hosts.
    pub fn deactivate_hosts(&self, ids: &[HostId]) -> Result<usize, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "UPDATE hosts SET active = 0 WHERE id IN ({})",
            placeholders(ids.len())
        );
        Ok(self.tx.execute(&sql, params_from_iter(ids.iter().map(|id| id.0)))?)
    }

    /// Live hosts eligible for archival: not known and not active.
    pub fn archivable_hosts(&self) -> Result<Vec<Host>, StoreError> {
        let sql = format!("SELECT {HOST_COLUMNS} FROM hosts WHERE known = 0 AND active = 0 ORDER BY id");
        let mut stmt = self.tx.prepare(&sql)?;
        let rows = stmt.query_map([], host_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Delete every port owned by a host.
    pub fn delete_ports_for_host(&self, host_id: HostId) -> Result<usize, StoreError> {
        Ok(self
            .tx
            .execute("DELETE FROM ports WHERE host_id = ?1", params![host_id.0])?)
    }

    /// Append a snapshot of `host` to the history archive.
    pub fn insert_history(&self, host: &Host, archived_at: DateTime<Utc>) -> Result<i64, StoreError> {
        self.tx.execute(
            "INSERT INTO history (host_id, ip, mac, host_name, name, hardware, last_seen_ms, known, active, archived_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                host.id.0,
                host.ip,
                host.mac,
                host.host_name,
                host.name,
                host.hardware,
                to_millis(host.last_seen),
                host.known,
                host.active,
                to_millis(archived_at)
            ],
        )?;
        Ok(self.tx.last_insert_rowid())
    }

    /// Remove a host from the live table. Its ports must already be gone.
    pub fn delete_host(&self, host_id: HostId) -> Result<(), StoreError> {
        let deleted = self
            .tx
            .execute("DELETE FROM hosts WHERE id = ?1", params![host_id.0])?;
        if deleted == 0 {
            return Err(StoreError::HostNotFound(host_id.to_string()));
        }
        Ok(())
    }
}

// ── Helpers ──────────────────────────────────────────────────────

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}
