//! Merge scan observations into the live inventory.
//!
//! Host rows merge on `ip` and port rows on `(host_id, port, protocol)`.
//! Fields the scan left blank are filled from the resolvers before the
//! write; fields the scan supplied are taken as-is.

use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};

use lanventory_core::{catalog, HostId, ObservedPort, PortId, ScannedHost};
use lanventory_store::{HostUpsert, InventoryDb, PortUpsert};

use crate::error::Result;
use crate::resolve::Resolvers;

/// Writes scanned hosts into the store, enriching blanks on the way.
#[derive(Clone)]
pub struct HostReconciler {
    db: InventoryDb,
    resolvers: Resolvers,
}

impl HostReconciler {
    pub fn new(db: InventoryDb, resolvers: Resolvers) -> Self {
        Self { db, resolvers }
    }

    pub fn db(&self) -> &InventoryDb {
        &self.db
    }

    /// Upsert one scanned host and return its id.
    pub async fn reconcile_host(
        &self,
        scanned: &ScannedHost,
        seen_at: DateTime<Utc>,
    ) -> Result<HostId> {
        let host_name = match non_empty(&scanned.host_name) {
            Some(name) => Some(name),
            None => self.enrich_host_name(scanned.ip).await,
        };
        let mac = match non_empty(&scanned.mac) {
            Some(mac) => Some(mac),
            None => self.enrich_mac(scanned.ip).await,
        };

        let upsert = HostUpsert::new(
            scanned.ip.to_string(),
            mac,
            host_name,
            scanned.hardware.clone(),
            seen_at,
        );
        let id = self.db.upsert_host(&upsert)?;

        tracing::debug!(
            ip = %scanned.ip,
            host_id = %id,
            name = %upsert.name,
            "Host reconciled"
        );
        Ok(id)
    }

    async fn enrich_host_name(&self, ip: Ipv4Addr) -> Option<String> {
        match self.resolvers.reverse_lookup_one(ip).await {
            Ok(name) if !name.is_empty() => Some(name),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(ip = %ip, error = %e, "Reverse DNS enrichment failed");
                None
            }
        }
    }

    async fn enrich_mac(&self, ip: Ipv4Addr) -> Option<String> {
        match self.resolvers.arp_lookup_one(ip).await {
            Ok(mac) if !mac.is_empty() => Some(mac),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(ip = %ip, error = %e, "ARP enrichment failed");
                None
            }
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_deref().filter(|v| !v.trim().is_empty()).map(String::from)
}

/// Build the stored form of one open-port observation.
///
/// A service name the scanner did not report falls back to the catalog;
/// an uncatalogued port is stored as "Unknown" with an empty description.
pub fn port_upsert(observed: &ObservedPort, seen_at: DateTime<Utc>) -> PortUpsert {
    let service = observed
        .service
        .clone()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| catalog::service_name(observed.port).to_string());
    let description = observed
        .product
        .clone()
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| catalog::description(observed.port).to_string());

    PortUpsert {
        port: observed.port,
        protocol: observed.protocol.clone(),
        service,
        description,
        seen_at,
    }
}

/// Upsert every open port of a host in one transaction.
pub fn reconcile_ports(
    db: &InventoryDb,
    host_id: HostId,
    observed: &[ObservedPort],
    seen_at: DateTime<Utc>,
) -> Result<Vec<PortId>> {
    if observed.is_empty() {
        return Ok(Vec::new());
    }

    let upserts: Vec<PortUpsert> = observed.iter().map(|p| port_upsert(p, seen_at)).collect();
    let ids = db.upsert_ports(host_id, &upserts)?;
    tracing::debug!(host_id = %host_id, count = ids.len(), "Ports reconciled");
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::TimeZone;

    use super::*;
    use crate::resolve::{NeighborLookup, PtrLookup};

    #[derive(Default)]
    struct CountingDns {
        calls: AtomicUsize,
        answer: Option<String>,
    }

    impl PtrLookup for CountingDns {
        fn lookup_ptr(&self, _ip: Ipv4Addr) -> io::Result<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.answer.clone())
        }
    }

    struct FailingArp;

    impl NeighborLookup for FailingArp {
        fn lookup_mac(&self, _ip: Ipv4Addr) -> io::Result<Option<String>> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "no access"))
        }
    }

    struct FixedArp(&'static str);

    impl NeighborLookup for FixedArp {
        fn lookup_mac(&self, _ip: Ipv4Addr) -> io::Result<Option<String>> {
            Ok(Some(self.0.to_string()))
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_760_000_000 + secs, 0).unwrap()
    }

    fn scanned(host_name: Option<&str>, mac: Option<&str>) -> ScannedHost {
        ScannedHost {
            ip: Ipv4Addr::new(10, 0, 0, 5),
            mac: mac.map(String::from),
            hardware: None,
            host_name: host_name.map(String::from),
            ports: Vec::new(),
        }
    }

    fn observed(port: u16, service: Option<&str>, product: Option<&str>) -> ObservedPort {
        ObservedPort {
            port,
            protocol: "tcp".to_string(),
            state: "open".to_string(),
            service: service.map(String::from),
            product: product.map(String::from),
        }
    }

    #[tokio::test]
    async fn test_blank_fields_are_enriched() {
        let dns = Arc::new(CountingDns {
            answer: Some("printer.office.lan".to_string()),
            ..Default::default()
        });
        let resolvers = Resolvers::new(
            dns.clone(),
            Arc::new(FixedArp("AA:BB:CC:00:00:05")),
            Duration::from_secs(1),
        );
        let reconciler = HostReconciler::new(InventoryDb::open_in_memory().unwrap(), resolvers);

        let id = reconciler.reconcile_host(&scanned(None, None), at(0)).await.unwrap();
        let host = reconciler.db().get_host(id).unwrap().unwrap();
        assert_eq!(host.host_name.as_deref(), Some("printer.office.lan"));
        assert_eq!(host.name, "printer");
        assert_eq!(host.mac.as_deref(), Some("AA:BB:CC:00:00:05"));
        assert_eq!(dns.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_scanned_fields_are_not_reresolved() {
        let dns = Arc::new(CountingDns {
            answer: Some("other.lan".to_string()),
            ..Default::default()
        });
        let resolvers = Resolvers::new(dns.clone(), Arc::new(FailingArp), Duration::from_secs(1));
        let reconciler = HostReconciler::new(InventoryDb::open_in_memory().unwrap(), resolvers);

        let id = reconciler
            .reconcile_host(&scanned(Some("pi.home.lan"), Some("AA:BB:CC:DD:EE:10")), at(0))
            .await
            .unwrap();
        let host = reconciler.db().get_host(id).unwrap().unwrap();
        assert_eq!(host.host_name.as_deref(), Some("pi.home.lan"));
        assert_eq!(host.mac.as_deref(), Some("AA:BB:CC:DD:EE:10"));
        assert_eq!(dns.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_enrichment_failure_leaves_field_null() {
        let resolvers = Resolvers::new(
            Arc::new(CountingDns::default()),
            Arc::new(FailingArp),
            Duration::from_secs(1),
        );
        let reconciler = HostReconciler::new(InventoryDb::open_in_memory().unwrap(), resolvers);

        let id = reconciler.reconcile_host(&scanned(None, None), at(0)).await.unwrap();
        let host = reconciler.db().get_host(id).unwrap().unwrap();
        assert_eq!(host.mac, None);
        assert_eq!(host.host_name, None);
        assert_eq!(host.name, "10.0.0.5");
        assert!(host.active);
        assert!(!host.known);
    }

    #[test]
    fn test_port_upsert_catalog_fallback() {
        let ssh = port_upsert(&observed(22, None, None), at(0));
        assert_eq!(ssh.service, "SSH");
        assert_eq!(ssh.description, "Secure Shell remote login");
        assert_eq!(ssh.protocol, "tcp");

        let unknown = port_upsert(&observed(48_123, None, None), at(0));
        assert_eq!(unknown.service, catalog::UNKNOWN_SERVICE);
        assert_eq!(unknown.description, "");

        let named = port_upsert(&observed(22, Some("ssh"), Some("OpenSSH 9.2p1")), at(0));
        assert_eq!(named.service, "ssh");
        assert_eq!(named.description, "OpenSSH 9.2p1");
    }

    #[test]
    fn test_reconcile_ports_upserts_in_place() {
        let db = InventoryDb::open_in_memory().unwrap();
        let host_id = db
            .upsert_host(&HostUpsert::new("10.0.0.5", None, None, None, at(0)))
            .unwrap();

        assert!(reconcile_ports(&db, host_id, &[], at(0)).unwrap().is_empty());

        let first = reconcile_ports(&db, host_id, &[observed(22, None, None)], at(0)).unwrap();
        let second =
            reconcile_ports(&db, host_id, &[observed(22, Some("ssh"), None)], at(10)).unwrap();
        assert_eq!(first, second);

        let ports = db.list_ports(host_id).unwrap();
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].service, "ssh");
        assert_eq!(ports[0].last_seen, at(10));
    }
}
