//! Reverse-DNS and neighbor-table lookups used to fill fields a scan left blank.
//!
//! Both lookups are blocking system calls, so each address runs on the
//! blocking pool with its own budget, counted from the moment the call
//! starts. A lookup that overruns is abandoned and reported as a timeout.

use std::fs;
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::error::LookupError;

/// Default per-lookup budget.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_millis(1000);

/// PTR record source. `Ok(None)` means the address has no PTR record.
pub trait PtrLookup: Send + Sync + 'static {
    fn lookup_ptr(&self, ip: Ipv4Addr) -> io::Result<Option<String>>;
}

/// Neighbor table source. `Ok(None)` means no MAC is known for the address.
pub trait NeighborLookup: Send + Sync + 'static {
    fn lookup_mac(&self, ip: Ipv4Addr) -> io::Result<Option<String>>;
}

/// Reverse DNS through the system resolver (`getnameinfo`).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemDns;

impl PtrLookup for SystemDns {
    fn lookup_ptr(&self, ip: Ipv4Addr) -> io::Result<Option<String>> {
        let name = dns_lookup::lookup_addr(&IpAddr::V4(ip))?;
        // getnameinfo falls back to the numeric form when there is no PTR.
        if name.is_empty() || name == ip.to_string() {
            Ok(None)
        } else {
            Ok(Some(name))
        }
    }
}

/// The kernel ARP cache as exposed in `/proc/net/arp`.
#[derive(Debug, Clone)]
pub struct ProcNetArp {
    path: PathBuf,
}

impl ProcNetArp {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for ProcNetArp {
    fn default() -> Self {
        Self::new("/proc/net/arp")
    }
}

impl NeighborLookup for ProcNetArp {
    fn lookup_mac(&self, ip: Ipv4Addr) -> io::Result<Option<String>> {
        let table = fs::read_to_string(&self.path)?;
        Ok(mac_from_arp_table(&table, ip))
    }
}

/// Find the hardware address for `ip` in `/proc/net/arp` text.
///
/// Columns: IP address, HW type, Flags, HW address, Mask, Device. Incomplete
/// entries carry an all-zero MAC and count as missing.
fn mac_from_arp_table(table: &str, ip: Ipv4Addr) -> Option<String> {
    let wanted = ip.to_string();
    table
        .lines()
        .skip(1)
        .map(|line| line.split_whitespace().collect::<Vec<_>>())
        .filter(|parts| parts.len() >= 6)
        .find(|parts| parts[0] == wanted)
        .map(|parts| parts[3].to_ascii_uppercase())
        .filter(|mac| mac != "00:00:00:00:00:00")
}

#[derive(Debug, Clone, Copy)]
enum Table {
    Dns,
    Arp,
}

impl Table {
    fn timed_out(self, ip: Ipv4Addr) -> LookupError {
        match self {
            Self::Dns => LookupError::DnsTimeout { ip },
            Self::Arp => LookupError::ArpTimeout { ip },
        }
    }

    fn failed(self, ip: Ipv4Addr, source: io::Error) -> LookupError {
        match self {
            Self::Dns => LookupError::Dns { ip, source },
            Self::Arp => LookupError::Arp { ip, source },
        }
    }
}

/// Address resolvers with a shared timeout.
#[derive(Clone)]
pub struct Resolvers {
    dns: Arc<dyn PtrLookup>,
    arp: Arc<dyn NeighborLookup>,
    timeout: Duration,
}

impl Resolvers {
    pub fn new(
        dns: Arc<dyn PtrLookup>,
        arp: Arc<dyn NeighborLookup>,
        timeout: Duration,
    ) -> Self {
        Self { dns, arp, timeout }
    }

    /// System resolver plus the kernel ARP cache.
    pub fn system(timeout: Duration) -> Self {
        Self::new(Arc::new(SystemDns), Arc::new(ProcNetArp::default()), timeout)
    }

    /// Hostname for each address, in input order. No PTR record yields `""`.
    pub async fn reverse_lookup(&self, ips: &[Ipv4Addr]) -> Result<Vec<String>, LookupError> {
        let dns = Arc::clone(&self.dns);
        self.bounded(ips, Table::Dns, move |ip| dns.lookup_ptr(ip))
            .await
    }

    pub async fn reverse_lookup_one(&self, ip: Ipv4Addr) -> Result<String, LookupError> {
        Ok(self.reverse_lookup(&[ip]).await?.pop().unwrap_or_default())
    }

    /// MAC for each address, in input order. Unknown neighbors yield `""`.
    pub async fn arp_lookup(&self, ips: &[Ipv4Addr]) -> Result<Vec<String>, LookupError> {
        let arp = Arc::clone(&self.arp);
        self.bounded(ips, Table::Arp, move |ip| arp.lookup_mac(ip))
            .await
    }

    pub async fn arp_lookup_one(&self, ip: Ipv4Addr) -> Result<String, LookupError> {
        Ok(self.arp_lookup(&[ip]).await?.pop().unwrap_or_default())
    }

    /// Run one blocking lookup per address concurrently, each bounded by the
    /// resolver timeout. The first failure, in input order, fails the whole call.
    async fn bounded<F>(
        &self,
        ips: &[Ipv4Addr],
        table: Table,
        lookup: F,
    ) -> Result<Vec<String>, LookupError>
    where
        F: Fn(Ipv4Addr) -> io::Result<Option<String>> + Clone + Send + 'static,
    {
        let budget = self.timeout;
        let pending: Vec<_> = ips
            .iter()
            .map(|&ip| {
                let lookup = lookup.clone();
                let (started_tx, started_rx) = oneshot::channel();
                let call = tokio::task::spawn_blocking(move || {
                    let _ = started_tx.send(());
                    lookup(ip)
                });
                // Time spent waiting for a blocking thread is not part of the budget.
                let timed = tokio::spawn(async move {
                    let _ = started_rx.await;
                    tokio::time::timeout(budget, call).await
                });
                (ip, timed)
            })
            .collect();

        let mut resolved = Vec::with_capacity(pending.len());
        for (ip, timed) in pending {
            match timed.await {
                Err(join) | Ok(Ok(Err(join))) => return Err(LookupError::Join(join.to_string())),
                Ok(Err(_)) => return Err(table.timed_out(ip)),
                Ok(Ok(Ok(Err(source)))) => return Err(table.failed(ip, source)),
                Ok(Ok(Ok(Ok(value)))) => resolved.push(value.unwrap_or_default()),
            }
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    struct StaticDns(HashMap<Ipv4Addr, String>);

    impl PtrLookup for StaticDns {
        fn lookup_ptr(&self, ip: Ipv4Addr) -> io::Result<Option<String>> {
            Ok(self.0.get(&ip).cloned())
        }
    }

    struct SlowDns(Duration);

    impl PtrLookup for SlowDns {
        fn lookup_ptr(&self, _ip: Ipv4Addr) -> io::Result<Option<String>> {
            std::thread::sleep(self.0);
            Ok(Some("late.lan".to_string()))
        }
    }

    struct BrokenDns;

    impl PtrLookup for BrokenDns {
        fn lookup_ptr(&self, _ip: Ipv4Addr) -> io::Result<Option<String>> {
            Err(io::Error::new(io::ErrorKind::Other, "SERVFAIL"))
        }
    }

    struct NoNeighbors;

    impl NeighborLookup for NoNeighbors {
        fn lookup_mac(&self, _ip: Ipv4Addr) -> io::Result<Option<String>> {
            Ok(None)
        }
    }

    const ARP_TABLE: &str = "\
IP address       HW type     Flags       HW address            Mask     Device
192.168.2.1      0x1         0x2         aa:bb:cc:00:00:01     *        eth0
192.168.2.20     0x1         0x0         00:00:00:00:00:00     *        eth0
192.168.2.30     0x1         0x2         aa:bb:cc:00:00:30     *        eth0
";

    fn ip(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(192, 168, 2, last)
    }

    fn with_dns(dns: impl PtrLookup, timeout: Duration) -> Resolvers {
        Resolvers::new(Arc::new(dns), Arc::new(NoNeighbors), timeout)
    }

    #[tokio::test]
    async fn test_missing_ptr_resolves_to_empty() {
        let resolvers = with_dns(StaticDns(HashMap::new()), DEFAULT_LOOKUP_TIMEOUT);
        let names = resolvers.reverse_lookup(&[ip(99)]).await.unwrap();
        assert_eq!(names, vec![String::new()]);
    }

    #[tokio::test]
    async fn test_reverse_lookup_preserves_order() {
        let records = HashMap::from([
            (ip(1), "router.lan".to_string()),
            (ip(30), "nas.lan".to_string()),
        ]);
        let resolvers = with_dns(StaticDns(records), DEFAULT_LOOKUP_TIMEOUT);

        let names = resolvers
            .reverse_lookup(&[ip(30), ip(7), ip(1)])
            .await
            .unwrap();
        assert_eq!(names, vec!["nas.lan", "", "router.lan"]);
        assert_eq!(resolvers.reverse_lookup_one(ip(1)).await.unwrap(), "router.lan");
        assert!(resolvers.reverse_lookup(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_slow_lookup_times_out() {
        let resolvers = with_dns(SlowDns(Duration::from_millis(400)), Duration::from_millis(50));
        let err = resolvers.reverse_lookup(&[ip(5)]).await.unwrap_err();
        assert!(matches!(err, LookupError::DnsTimeout { ip: addr } if addr == ip(5)));
        assert_eq!(err.to_string(), "DNS lookup timed out: 192.168.2.5");
    }

    #[test]
    fn test_queued_lookups_each_get_a_full_budget() {
        // One blocking thread runs the eight 40ms lookups back to back,
        // well past a single 200ms window measured from the first call.
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .max_blocking_threads(1)
            .build()
            .unwrap();
        let resolvers = with_dns(SlowDns(Duration::from_millis(40)), Duration::from_millis(200));
        let ips: Vec<_> = (1..=8).map(ip).collect();

        let names = runtime
            .block_on(resolvers.reverse_lookup(&ips))
            .unwrap();
        assert_eq!(names, vec!["late.lan"; 8]);
    }

    #[tokio::test]
    async fn test_dns_failure_is_not_a_timeout() {
        let resolvers = with_dns(BrokenDns, DEFAULT_LOOKUP_TIMEOUT);
        let err = resolvers.reverse_lookup_one(ip(5)).await.unwrap_err();
        assert!(matches!(err, LookupError::Dns { .. }));
    }

    #[test]
    fn test_mac_from_arp_table() {
        assert_eq!(
            mac_from_arp_table(ARP_TABLE, ip(1)).as_deref(),
            Some("AA:BB:CC:00:00:01")
        );
        // Incomplete entry.
        assert_eq!(mac_from_arp_table(ARP_TABLE, ip(20)), None);
        assert_eq!(mac_from_arp_table(ARP_TABLE, ip(200)), None);
        assert_eq!(mac_from_arp_table("", ip(1)), None);
    }

    #[tokio::test]
    async fn test_arp_lookup_reads_table_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(ARP_TABLE.as_bytes()).unwrap();

        let resolvers = Resolvers::new(
            Arc::new(StaticDns(HashMap::new())),
            Arc::new(ProcNetArp::new(file.path())),
            DEFAULT_LOOKUP_TIMEOUT,
        );
        let macs = resolvers.arp_lookup(&[ip(30), ip(20)]).await.unwrap();
        assert_eq!(macs, vec!["AA:BB:CC:00:00:30", ""]);
    }

    #[tokio::test]
    async fn test_missing_arp_table_is_an_arp_error() {
        let resolvers = Resolvers::new(
            Arc::new(StaticDns(HashMap::new())),
            Arc::new(ProcNetArp::new("/nonexistent/lanventory/arp")),
            DEFAULT_LOOKUP_TIMEOUT,
        );
        let err = resolvers.arp_lookup_one(ip(1)).await.unwrap_err();
        assert!(matches!(err, LookupError::Arp { .. }));
    }
}
