//! Core domain types for the lanventory inventory.
//!
//! These types describe the live host table, the ports each host exposes,
//! the append-only history archive, and the normalized records the scanner
//! hands to the reconcilers.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

use chrono::{DateTime, Utc};
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

use crate::error::InventoryError;

/// Ports scanned when the caller does not ask for anything else.
pub const DEFAULT_PORTS: [u16; 2] = [22, 2222];

/// Protocol stored when the scanner does not report one.
pub const DEFAULT_PROTOCOL: &str = "tcp";

// ── Identifiers ───────────────────────────────────────────────────

/// Surrogate key of a live host. Stable for as long as the host stays live.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostId(pub i64);

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortId(pub i64);

// ── Stored Rows ───────────────────────────────────────────────────

/// A device currently believed present on the network.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Host {
    pub id: HostId,
    pub ip: String,
    pub mac: Option<String>,
    pub host_name: Option<String>,
    /// Display name, never blank. See [`display_name`].
    pub name: String,
    pub hardware: Option<String>,
    pub last_seen: DateTime<Utc>,
    /// Operator flag: never archive this host.
    pub known: bool,
    pub active: bool,
}

/// An open service observed on a live host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Port {
    pub id: PortId,
    pub host_id: HostId,
    pub port: u16,
    pub protocol: String,
    pub service: String,
    pub description: String,
    pub last_seen: DateTime<Utc>,
}

/// A port row joined with the identity of the host that owns it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortWithHost {
    pub port: Port,
    pub ip: String,
    pub host_name: Option<String>,
    pub name: String,
}

/// Snapshot of a host taken at the moment it left the live set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    pub id: i64,
    /// The live id the host had before archival.
    pub host_id: HostId,
    pub ip: String,
    pub mac: Option<String>,
    pub host_name: Option<String>,
    pub name: String,
    pub hardware: Option<String>,
    pub last_seen: DateTime<Utc>,
    pub known: bool,
    pub active: bool,
    pub archived_at: DateTime<Utc>,
}

// ── Scan Records ──────────────────────────────────────────────────

/// One host as reported by a single scan, before reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedHost {
    pub ip: Ipv4Addr,
    pub mac: Option<String>,
    pub hardware: Option<String>,
    pub host_name: Option<String>,
    pub ports: Vec<ObservedPort>,
}

/// A port observation from the scanner. Only open ports survive parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedPort {
    pub port: u16,
    pub protocol: String,
    pub state: String,
    pub service: Option<String>,
    /// Product and version banner, when the scanner fingerprinted one.
    pub product: Option<String>,
}

// ── Scan Inputs ───────────────────────────────────────────────────

/// Which ports a scan probes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortSelection {
    /// An explicit, non-empty set of ports.
    List(Vec<u16>),
    /// Every port from 1 to 65535.
    All,
}

impl Default for PortSelection {
    fn default() -> Self {
        Self::List(DEFAULT_PORTS.to_vec())
    }
}

impl PortSelection {
    /// Build a selection from an explicit list, rejecting empty lists and port 0.
    pub fn list(ports: impl IntoIterator<Item = u16>) -> Result<Self, InventoryError> {
        let mut ports: Vec<u16> = ports.into_iter().collect();
        if ports.is_empty() {
            return Err(InventoryError::InvalidPorts("empty port list".to_string()));
        }
        if ports.contains(&0) {
            return Err(InventoryError::InvalidPorts(
                "port 0 is not scannable".to_string(),
            ));
        }
        ports.sort_unstable();
        ports.dedup();
        Ok(Self::List(ports))
    }

    /// Parse a comma-separated port list such as `22,80,443`, or `all`.
    pub fn parse(spec: &str) -> Result<Self, InventoryError> {
        let spec = spec.trim();
        if spec.eq_ignore_ascii_case("all") || spec == "-" {
            return Ok(Self::All);
        }

        let ports = spec
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| {
                p.parse::<u16>()
                    .map_err(|_| InventoryError::InvalidPorts(format!("not a port number: {p}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::list(ports)
    }

    /// The value nmap expects after `-p`.
    pub fn nmap_arg(&self) -> String {
        match self {
            Self::All => "1-65535".to_string(),
            Self::List(ports) => ports
                .iter()
                .map(u16::to_string)
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

/// A validated IPv4 scan range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanTarget(Ipv4Net);

impl ScanTarget {
    /// Parse CIDR notation. A bare address is treated as a /32.
    pub fn parse(cidr: &str) -> Result<Self, InventoryError> {
        let cidr = cidr.trim();
        if let Ok(net) = cidr.parse::<Ipv4Net>() {
            return Ok(Self(net.trunc()));
        }
        cidr.parse::<Ipv4Addr>()
            .map(|addr| Self(Ipv4Net::from(addr)))
            .map_err(|_| InventoryError::InvalidTarget(cidr.to_string()))
    }

    pub fn net(&self) -> Ipv4Net {
        self.0
    }

    /// Addresses to probe. Network and broadcast addresses are skipped for
    /// prefixes shorter than /31.
    pub fn addresses(&self) -> impl Iterator<Item = Ipv4Addr> {
        self.0.hosts()
    }

    /// Whether a stored ip string falls inside this range.
    pub fn contains_ip(&self, ip: &str) -> bool {
        match ip.parse::<IpAddr>() {
            Ok(IpAddr::V4(v4)) => self.0.contains(&v4),
            _ => false,
        }
    }
}

impl fmt::Display for ScanTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Derive the display name of a host: the first DNS label of its hostname,
/// or the ip when there is no usable hostname.
pub fn display_name(host_name: Option<&str>, ip: &str) -> String {
    host_name
        .and_then(|h| h.trim().split('.').next())
        .filter(|label| !label.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| ip.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_uses_first_label() {
        assert_eq!(display_name(Some("nas.home.lan"), "10.0.0.2"), "nas");
        assert_eq!(display_name(Some("router"), "10.0.0.1"), "router");
    }

    #[test]
    fn display_name_falls_back_to_ip() {
        assert_eq!(display_name(None, "10.0.0.5"), "10.0.0.5");
        assert_eq!(display_name(Some(""), "10.0.0.5"), "10.0.0.5");
        assert_eq!(display_name(Some(".local"), "10.0.0.5"), "10.0.0.5");
    }

    #[test]
    fn port_selection_parse() {
        assert_eq!(
            PortSelection::parse("2222, 22,22").unwrap(),
            PortSelection::List(vec![22, 2222])
        );
        assert_eq!(PortSelection::parse("all").unwrap(), PortSelection::All);
        assert!(PortSelection::parse("").is_err());
        assert!(PortSelection::parse("0").is_err());
        assert!(PortSelection::parse("70000").is_err());
        assert!(PortSelection::parse("ssh").is_err());
    }

    #[test]
    fn port_selection_nmap_arg() {
        assert_eq!(PortSelection::default().nmap_arg(), "22,2222");
        assert_eq!(PortSelection::All.nmap_arg(), "1-65535");
    }

    #[test]
    fn scan_target_addresses() {
        let target = ScanTarget::parse("10.0.0.0/30").unwrap();
        let addrs: Vec<_> = target.addresses().collect();
        assert_eq!(
            addrs,
            vec![Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2)]
        );

        let single = ScanTarget::parse("10.0.0.5").unwrap();
        assert_eq!(
            single.addresses().collect::<Vec<_>>(),
            vec![Ipv4Addr::new(10, 0, 0, 5)]
        );
    }

    #[test]
    fn scan_target_rejects_garbage() {
        assert!(ScanTarget::parse("10.0.0.0/33").is_err());
        assert!(ScanTarget::parse("fe80::/64").is_err());
        assert!(ScanTarget::parse("lan").is_err());
    }

    #[test]
    fn scan_target_contains() {
        let target = ScanTarget::parse("192.168.2.0/24").unwrap();
        assert!(target.contains_ip("192.168.2.77"));
        assert!(!target.contains_ip("192.168.3.1"));
        assert!(!target.contains_ip("not-an-ip"));
    }

    #[test]
    fn port_selection_serializes_lowercase() {
        let json = serde_json::to_string(&PortSelection::All).unwrap();
        assert_eq!(json, "\"all\"");

        let parsed: PortSelection = serde_json::from_str(r#"{"list":[22,80]}"#).unwrap();
        assert_eq!(parsed, PortSelection::List(vec![22, 80]));
    }
}
