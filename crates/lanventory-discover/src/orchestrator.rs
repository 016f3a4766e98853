//! Scan cycle orchestration.
//!
//! One cycle scans every address of a range with bounded concurrency, runs
//! each result through parse and reconciliation, and finishes with a single
//! lifecycle transition. A failure at one address is recorded and never
//! affects the others; only a failed lifecycle transaction fails the cycle.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use uuid::Uuid;

use lanventory_core::{PortSelection, ScanTarget};

use crate::config::DiscoverConfig;
use crate::error::{DiscoverError, Result};
use crate::lifecycle::{self, ArchiveSummary};
use crate::nmap_xml::parse_scanned_host;
use crate::reconcile::{reconcile_ports, HostReconciler};
use crate::scanner::{check_output, HostScanner};

/// A per-address failure recorded during a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressFailure {
    pub ip: String,
    pub error: String,
}

/// Summary of one completed scan cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub target: String,
    pub ports: String,
    pub started_at: DateTime<Utc>,
    pub addresses: usize,
    pub hosts_up: usize,
    pub ports_recorded: usize,
    pub failures: Vec<AddressFailure>,
    pub lifecycle: ArchiveSummary,
    pub duration_ms: u64,
}

/// Everything one address needs, cloned into its task.
struct AddressPipeline<S> {
    scanner: Arc<S>,
    reconciler: HostReconciler,
    scan_timeout: Duration,
}

impl<S> Clone for AddressPipeline<S> {
    fn clone(&self) -> Self {
        Self {
            scanner: Arc::clone(&self.scanner),
            reconciler: self.reconciler.clone(),
            scan_timeout: self.scan_timeout,
        }
    }
}

impl<S: HostScanner> AddressPipeline<S> {
    /// Scan, parse and reconcile one address. Returns the number of ports
    /// recorded, or `None` when nothing answered at the address.
    async fn run(&self, ip: Ipv4Addr, ports: &PortSelection) -> Result<Option<usize>> {
        let output = tokio::time::timeout(self.scan_timeout, self.scanner.scan_host(ip, ports))
            .await
            .map_err(|_| DiscoverError::ScanTimedOut {
                ip,
                timeout: self.scan_timeout,
            })??;
        check_output(&output)?;

        let Some(host) = parse_scanned_host(&output.stdout)? else {
            tracing::debug!(ip = %ip, "No host up");
            return Ok(None);
        };

        let seen_at = Utc::now();
        let host_id = self.reconciler.reconcile_host(&host, seen_at).await?;
        let recorded = reconcile_ports(self.reconciler.db(), host_id, &host.ports, seen_at)?;

        tracing::info!(
            ip = %ip,
            host_id = %host_id,
            open_ports = recorded.len(),
            "Host recorded"
        );
        Ok(Some(recorded.len()))
    }
}

/// Drives scan cycles. Clones share the scanner, the concurrency limit and
/// the cycle lock, so cycles started from any clone never overlap.
pub struct Orchestrator<S> {
    pipeline: AddressPipeline<S>,
    limiter: Arc<Semaphore>,
    cycle_lock: Arc<Mutex<()>>,
}

impl<S> Clone for Orchestrator<S> {
    fn clone(&self) -> Self {
        Self {
            pipeline: self.pipeline.clone(),
            limiter: Arc::clone(&self.limiter),
            cycle_lock: Arc::clone(&self.cycle_lock),
        }
    }
}

impl<S: HostScanner> Orchestrator<S> {
    pub fn new(
        scanner: S,
        reconciler: HostReconciler,
        max_concurrent_scans: usize,
        scan_timeout: Duration,
    ) -> Self {
        Self {
            pipeline: AddressPipeline {
                scanner: Arc::new(scanner),
                reconciler,
                scan_timeout,
            },
            limiter: Arc::new(Semaphore::new(max_concurrent_scans.max(1))),
            cycle_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn from_config(scanner: S, reconciler: HostReconciler, config: &DiscoverConfig) -> Self {
        Self::new(
            scanner,
            reconciler,
            config.max_concurrent_scans,
            config.scan_timeout(),
        )
    }

    /// Run one full cycle over `target`.
    ///
    /// Waits for any cycle already in progress to finish first.
    pub async fn run_cycle(
        &self,
        target: &ScanTarget,
        ports: &PortSelection,
    ) -> Result<CycleReport> {
        let _cycle = self.cycle_lock.lock().await;

        let cycle_id = Uuid::new_v4();
        let started_at = Utc::now();
        let clock = Instant::now();
        tracing::info!(
            cycle_id = %cycle_id,
            cidr = %target,
            ports = %ports.nmap_arg(),
            "Scan cycle started"
        );

        let mut tasks = JoinSet::new();
        let mut task_ips = HashMap::new();
        let mut addresses = 0;
        for ip in target.addresses() {
            addresses += 1;
            let permit = Arc::clone(&self.limiter)
                .acquire_owned()
                .await
                .map_err(|_| DiscoverError::LimiterClosed)?;
            let pipeline = self.pipeline.clone();
            let ports = ports.clone();
            let handle = tasks.spawn(async move {
                let outcome = pipeline.run(ip, &ports).await;
                drop(permit);
                (ip, outcome)
            });
            task_ips.insert(handle.id(), ip);
        }

        let mut hosts_up = 0;
        let mut ports_recorded = 0;
        let mut failed: BTreeMap<Ipv4Addr, String> = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(Some(count)))) => {
                    hosts_up += 1;
                    ports_recorded += count;
                }
                Ok((_, Ok(None))) => {}
                Ok((ip, Err(e))) => {
                    tracing::error!(ip = %ip, error = %e, "Address scan failed");
                    failed.insert(ip, e.to_string());
                }
                Err(e) => match task_ips.get(&e.id()) {
                    Some(&ip) => {
                        tracing::error!(ip = %ip, error = %e, "Address scan task panicked");
                        failed.insert(ip, e.to_string());
                    }
                    None => tracing::error!(error = %e, "Untracked scan task failed"),
                },
            }
        }

        let failures: Vec<AddressFailure> = failed
            .iter()
            .map(|(ip, error)| AddressFailure {
                ip: ip.to_string(),
                error: error.clone(),
            })
            .collect();

        // An address that could not be scanned is not evidence of absence.
        let unscanned: HashSet<Ipv4Addr> = failed.into_keys().collect();
        let db = self.pipeline.reconciler.db();
        let lifecycle = match lifecycle::archive_unconfirmed(
            db,
            target,
            &unscanned,
            started_at,
            Utc::now(),
        ) {
            Ok(summary) => summary,
            Err(e) => {
                tracing::error!(cycle_id = %cycle_id, cidr = %target, error = %e, "Lifecycle transition failed");
                return Err(e);
            }
        };

        let report = CycleReport {
            cycle_id,
            target: target.to_string(),
            ports: ports.nmap_arg(),
            started_at,
            addresses,
            hosts_up,
            ports_recorded,
            failures,
            lifecycle,
            duration_ms: clock.elapsed().as_millis() as u64,
        };

        tracing::info!(
            cycle_id = %report.cycle_id,
            cidr = %report.target,
            addresses = report.addresses,
            hosts_up = report.hosts_up,
            ports_recorded = report.ports_recorded,
            failures = report.failures.len(),
            archived = report.lifecycle.archived,
            duration_ms = report.duration_ms,
            "Scan cycle complete"
        );
        Ok(report)
    }
}
