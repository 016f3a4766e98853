//! Error types for the lanventory-discover crate.

use std::net::Ipv4Addr;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiscoverError {
    #[error("Nmap not found at path: {path}")]
    NmapNotFound { path: String },

    #[error("Nmap exited with code {code}: {stderr}")]
    NmapFailed { code: i32, stderr: String },

    #[error("Nmap scan of {ip} timed out after {timeout:?}")]
    ScanTimedOut { ip: Ipv4Addr, timeout: Duration },

    #[error("Failed to parse nmap XML output: {0}")]
    XmlParse(String),

    #[error(transparent)]
    InvalidInput(#[from] lanventory_core::InventoryError),

    #[error("Store error: {0}")]
    Store(#[from] lanventory_store::StoreError),

    #[error("Scan concurrency limiter closed")]
    LimiterClosed,
}

/// Failures from the reverse-DNS and neighbor-table resolvers.
#[derive(Error, Debug)]
pub enum LookupError {
    #[error("DNS lookup timed out: {ip}")]
    DnsTimeout { ip: Ipv4Addr },

    #[error("DNS lookup failed for {ip}: {source}")]
    Dns {
        ip: Ipv4Addr,
        #[source]
        source: std::io::Error,
    },

    #[error("ARP lookup timed out: {ip}")]
    ArpTimeout { ip: Ipv4Addr },

    #[error("ARP lookup failed for {ip}: {source}")]
    Arp {
        ip: Ipv4Addr,
        #[source]
        source: std::io::Error,
    },

    #[error("Lookup task failed: {0}")]
    Join(String),
}

pub type Result<T> = std::result::Result<T, DiscoverError>;
