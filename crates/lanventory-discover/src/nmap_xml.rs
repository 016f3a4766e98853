//! Nmap XML output deserialization.
//!
//! Nmap's `-oX -` flag writes structured XML to stdout. The structs below
//! deserialize it with `quick-xml` + serde. Repeated children (`<host>`,
//! `<address>`, `<hostname>`, `<port>`) are always collected into a `Vec`,
//! so a lone element and a list of elements come out in the same shape.

use std::net::Ipv4Addr;

use serde::Deserialize;

use lanventory_core::{ObservedPort, ScannedHost, DEFAULT_PROTOCOL};

use crate::error::{DiscoverError, Result};

/// Root element: `<nmaprun>`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename = "nmaprun")]
pub struct NmapRun {
    #[serde(rename = "@scanner")]
    pub scanner: Option<String>,
    #[serde(rename = "@args")]
    pub args: Option<String>,
    #[serde(rename = "host", default)]
    pub hosts: Vec<NmapHost>,
}

/// A single host from scan results.
#[derive(Debug, Clone, Deserialize)]
pub struct NmapHost {
    pub status: Option<HostStatus>,
    #[serde(rename = "address", default)]
    pub addresses: Vec<Address>,
    pub hostnames: Option<Hostnames>,
    pub ports: Option<Ports>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostStatus {
    #[serde(rename = "@state")]
    pub state: String,
    #[serde(rename = "@reason")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Address {
    #[serde(rename = "@addr")]
    pub addr: String,
    #[serde(rename = "@addrtype")]
    pub addr_type: String,
    #[serde(rename = "@vendor")]
    pub vendor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Hostnames {
    #[serde(rename = "hostname", default)]
    pub hostnames: Vec<Hostname>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Hostname {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "@type")]
    pub hostname_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Ports {
    #[serde(rename = "port", default)]
    pub ports: Vec<NmapPort>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NmapPort {
    #[serde(rename = "@protocol")]
    pub protocol: Option<String>,
    #[serde(rename = "@portid")]
    pub port_id: u16,
    pub state: PortState,
    pub service: Option<NmapService>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortState {
    #[serde(rename = "@state")]
    pub state: String,
    #[serde(rename = "@reason")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NmapService {
    #[serde(rename = "@name")]
    pub name: Option<String>,
    #[serde(rename = "@product")]
    pub product: Option<String>,
    #[serde(rename = "@version")]
    pub version: Option<String>,
}

impl NmapHost {
    /// Extract the IPv4 address, if present.
    pub fn ipv4(&self) -> Option<Ipv4Addr> {
        self.addresses
            .iter()
            .find(|a| a.addr_type == "ipv4")
            .and_then(|a| a.addr.parse().ok())
    }

    fn mac_address(&self) -> Option<&Address> {
        self.addresses.iter().find(|a| a.addr_type == "mac")
    }

    /// Extract the MAC address, if present.
    pub fn mac(&self) -> Option<&str> {
        self.mac_address().map(|a| a.addr.as_str())
    }

    /// Vendor nmap derived from the MAC OUI.
    pub fn vendor(&self) -> Option<&str> {
        self.mac_address().and_then(|a| a.vendor.as_deref())
    }

    /// Extract the first hostname, if present.
    pub fn hostname(&self) -> Option<&str> {
        self.hostnames
            .as_ref()
            .and_then(|hn| hn.hostnames.first())
            .map(|h| h.name.as_str())
    }

    /// Check if the host is up.
    pub fn is_up(&self) -> bool {
        self.status.as_ref().is_some_and(|s| s.state == "up")
    }

    /// Ports nmap reported in state `open`. Closed and filtered ports are dropped.
    pub fn open_ports(&self) -> impl Iterator<Item = &NmapPort> {
        self.ports
            .iter()
            .flat_map(|p| p.ports.iter())
            .filter(|p| p.state.state == "open")
    }
}

impl NmapPort {
    fn observed(&self) -> ObservedPort {
        let service = self.service.as_ref();
        ObservedPort {
            port: self.port_id,
            protocol: self
                .protocol
                .clone()
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| DEFAULT_PROTOCOL.to_string()),
            state: self.state.state.clone(),
            service: service
                .and_then(|s| s.name.clone())
                .filter(|n| !n.is_empty() && n != "unknown"),
            product: service.and_then(|s| match (&s.product, &s.version) {
                (Some(p), Some(v)) => Some(format!("{p} {v}")),
                (Some(p), None) => Some(p.clone()),
                (None, Some(v)) => Some(v.clone()),
                (None, None) => None,
            }),
        }
    }
}

/// Parse nmap XML bytes into a structured `NmapRun`.
pub fn parse_nmap_xml(xml: &[u8]) -> Result<NmapRun> {
    quick_xml::de::from_reader(xml).map_err(|e| DiscoverError::XmlParse(format!("{e}")))
}

/// Normalize the first live IPv4 host of a run. `None` when nmap saw nothing.
pub fn normalize(run: &NmapRun) -> Option<ScannedHost> {
    run.hosts.iter().filter(|h| h.is_up()).find_map(|h| {
        let ip = h.ipv4()?;
        Some(ScannedHost {
            ip,
            mac: h.mac().map(String::from),
            hardware: h.vendor().map(String::from),
            host_name: h.hostname().filter(|n| !n.is_empty()).map(String::from),
            ports: h.open_ports().map(NmapPort::observed).collect(),
        })
    })
}

/// Parse the scan output for one target into at most one host record.
pub fn parse_scanned_host(xml: &[u8]) -> Result<Option<ScannedHost>> {
    Ok(normalize(&parse_nmap_xml(xml)?))
}
