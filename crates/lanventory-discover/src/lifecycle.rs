//! End-of-cycle lifecycle transition.
//!
//! After every address of a cycle has been reconciled, hosts in the cycle's
//! range that were not reconfirmed lose their `active` flag, and the ones
//! the operator has not marked `known` move to history together with the
//! removal of their ports. Addresses whose scan failed this cycle are left
//! exactly as they were. The whole transition is one transaction.

use std::collections::HashSet;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use lanventory_core::{HostId, ScanTarget};
use lanventory_store::InventoryDb;

use crate::error::Result;

/// What one lifecycle transition changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ArchiveSummary {
    pub deactivated: usize,
    pub archived: usize,
    pub ports_removed: usize,
}

/// Deactivate hosts in `target` not seen since `cycle_started`, then archive
/// every inactive, unknown host in `target`. Hosts at `unscanned` addresses
/// are skipped by both steps.
///
/// Ports are deleted before their host, and each host is copied to history
/// before it is removed. Any failure rolls the entire transition back.
pub fn archive_unconfirmed(
    db: &InventoryDb,
    target: &ScanTarget,
    unscanned: &HashSet<Ipv4Addr>,
    cycle_started: DateTime<Utc>,
    archived_at: DateTime<Utc>,
) -> Result<ArchiveSummary> {
    let in_scope = |ip: &str| {
        target.contains_ip(ip)
            && ip
                .parse::<Ipv4Addr>()
                .map_or(true, |addr| !unscanned.contains(&addr))
    };

    let summary = db.transaction(|txn| {
        let mut summary = ArchiveSummary::default();

        let stale: Vec<HostId> = txn
            .hosts_not_seen_since(cycle_started)?
            .into_iter()
            .filter(|h| h.active && in_scope(&h.ip))
            .map(|h| h.id)
            .collect();
        summary.deactivated = txn.deactivate_hosts(&stale)?;

        let archivable: Vec<_> = txn
            .archivable_hosts()?
            .into_iter()
            .filter(|h| in_scope(&h.ip))
            .collect();
        if archivable.is_empty() {
            return Ok(summary);
        }

        for host in &archivable {
            summary.ports_removed += txn.delete_ports_for_host(host.id)?;
        }
        for host in &archivable {
            txn.insert_history(host, archived_at)?;
            txn.delete_host(host.id)?;
            tracing::info!(ip = %host.ip, host_id = %host.id, "Host archived to history");
        }
        summary.archived = archivable.len();

        Ok(summary)
    })?;

    tracing::info!(
        cidr = %target,
        deactivated = summary.deactivated,
        archived = summary.archived,
        ports_removed = summary.ports_removed,
        "Lifecycle transition complete"
    );
    Ok(summary)
}
