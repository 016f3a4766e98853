//! Read operations for the inventory.

use rusqlite::{params, OptionalExtension, Row};

use lanventory_core::{HistoryEntry, Host, HostId, Port, PortId, PortWithHost};

use crate::client::{from_millis, InventoryDb, StoreError};

pub(crate) const HOST_COLUMNS: &str =
    "id, ip, mac, host_name, name, hardware, last_seen_ms, known, active";

const PORT_COLUMNS: &str = "p.id, p.host_id, p.port, p.protocol, p.service, p.description, p.last_seen_ms";

impl InventoryDb {
    // ── Hosts ────────────────────────────────────────────────────

    /// Every live host, ordered by id.
    pub fn list_hosts(&self) -> Result<Vec<Host>, StoreError> {
        let conn = self.lock()?;
        let sql = format!("SELECT {HOST_COLUMNS} FROM hosts ORDER BY id");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], host_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Find a live host by ip.
    pub fn get_host_by_ip(&self, ip: &str) -> Result<Option<Host>, StoreError> {
        let conn = self.lock()?;
        let sql = format!("SELECT {HOST_COLUMNS} FROM hosts WHERE ip = ?1");
        Ok(conn.query_row(&sql, params![ip], host_from_row).optional()?)
    }

    /// Find a live host by id.
    pub fn get_host(&self, id: HostId) -> Result<Option<Host>, StoreError> {
        let conn = self.lock()?;
        let sql = format!("SELECT {HOST_COLUMNS} FROM hosts WHERE id = ?1");
        Ok(conn.query_row(&sql, params![id.0], host_from_row).optional()?)
    }

    /// Live hosts with a real hostname: present and not just the ip again.
    pub fn hosts_with_hostname(&self) -> Result<Vec<Host>, StoreError> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {HOST_COLUMNS} FROM hosts
             WHERE host_name IS NOT NULL AND host_name <> '' AND host_name <> ip
             ORDER BY id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], host_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // ── Ports ────────────────────────────────────────────────────

    /// Ports of one host, ordered by protocol then port number.
    pub fn list_ports(&self, host_id: HostId) -> Result<Vec<Port>, StoreError> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {PORT_COLUMNS} FROM ports p WHERE p.host_id = ?1 ORDER BY p.protocol, p.port"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![host_id.0], port_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Every port joined with its owning host.
    pub fn ports_with_host_info(&self) -> Result<Vec<PortWithHost>, StoreError> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {PORT_COLUMNS}, h.ip, h.host_name, h.name
             FROM ports p INNER JOIN hosts h ON p.host_id = h.id
             ORDER BY h.id, p.protocol, p.port"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], port_with_host_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Ports of the live host with this ip.
    pub fn ports_by_host_ip(&self, ip: &str) -> Result<Vec<PortWithHost>, StoreError> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {PORT_COLUMNS}, h.ip, h.host_name, h.name
             FROM ports p INNER JOIN hosts h ON p.host_id = h.id
             WHERE h.ip = ?1
             ORDER BY p.protocol, p.port"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![ip], port_with_host_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Ports whose owning host is no longer in the live table.
    ///
    /// Always zero while archival goes through the lifecycle transaction.
    pub fn orphan_port_count(&self) -> Result<i64, StoreError> {
        let conn = self.lock()?;
        Ok(conn.query_row(
            "SELECT COUNT(1) FROM ports p LEFT JOIN hosts h ON p.host_id = h.id WHERE h.id IS NULL",
            [],
            |r| r.get(0),
        )?)
    }

    // ── History ──────────────────────────────────────────────────

    /// The full archive, oldest entry first.
    pub fn list_history(&self) -> Result<Vec<HistoryEntry>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, host_id, ip, mac, host_name, name, hardware, last_seen_ms, known, active, archived_at_ms
             FROM history ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(HistoryEntry {
                id: row.get(0)?,
                host_id: HostId(row.get(1)?),
                ip: row.get(2)?,
                mac: row.get(3)?,
                host_name: row.get(4)?,
                name: row.get(5)?,
                hardware: row.get(6)?,
                last_seen: from_millis(7, row.get(7)?)?,
                known: row.get(8)?,
                active: row.get(9)?,
                archived_at: from_millis(10, row.get(10)?)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

// ── Row Mapping ──────────────────────────────────────────────────

pub(crate) fn host_from_row(row: &Row<'_>) -> rusqlite::Result<Host> {
    Ok(Host {
        id: HostId(row.get(0)?),
        ip: row.get(1)?,
        mac: row.get(2)?,
        host_name: row.get(3)?,
        name: row.get(4)?,
        hardware: row.get(5)?,
        last_seen: from_millis(6, row.get(6)?)?,
        known: row.get(7)?,
        active: row.get(8)?,
    })
}

fn port_from_row(row: &Row<'_>) -> rusqlite::Result<Port> {
    Ok(Port {
        id: PortId(row.get(0)?),
        host_id: HostId(row.get(1)?),
        port: row.get(2)?,
        protocol: row.get(3)?,
        service: row.get(4)?,
        description: row.get(5)?,
        last_seen: from_millis(6, row.get(6)?)?,
    })
}

fn port_with_host_from_row(row: &Row<'_>) -> rusqlite::Result<PortWithHost> {
    Ok(PortWithHost {
        port: port_from_row(row)?,
        ip: row.get(7)?,
        host_name: row.get(8)?,
        name: row.get(9)?,
    })
}
