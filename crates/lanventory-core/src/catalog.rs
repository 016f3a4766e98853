//! Static catalog of well-known ports.
//!
//! Used to label a port when the scanner reports it open without naming the
//! service behind it.

/// A catalog entry: short service name plus a one-line description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceInfo {
    pub port: u16,
    pub name: &'static str,
    pub description: &'static str,
}

/// Service name stored when neither the scanner nor the catalog knows the port.
pub const UNKNOWN_SERVICE: &str = "Unknown";

// Sorted by port so `lookup` can binary search.
const CATALOG: &[ServiceInfo] = &[
    entry(20, "FTP-DATA", "File Transfer Protocol data channel"),
    entry(21, "FTP", "File Transfer Protocol control channel"),
    entry(22, "SSH", "Secure Shell remote login"),
    entry(23, "Telnet", "Unencrypted remote terminal"),
    entry(25, "SMTP", "Simple Mail Transfer Protocol"),
    entry(53, "DNS", "Domain Name System"),
    entry(67, "DHCP", "DHCP server"),
    entry(68, "DHCP-Client", "DHCP client"),
    entry(69, "TFTP", "Trivial File Transfer Protocol"),
    entry(80, "HTTP", "Web server"),
    entry(110, "POP3", "Post Office Protocol v3"),
    entry(111, "RPCBind", "ONC RPC port mapper"),
    entry(123, "NTP", "Network Time Protocol"),
    entry(135, "MSRPC", "Microsoft RPC endpoint mapper"),
    entry(137, "NetBIOS-NS", "NetBIOS name service"),
    entry(138, "NetBIOS-DGM", "NetBIOS datagram service"),
    entry(139, "NetBIOS-SSN", "NetBIOS session service"),
    entry(143, "IMAP", "Internet Message Access Protocol"),
    entry(161, "SNMP", "Simple Network Management Protocol"),
    entry(389, "LDAP", "Lightweight Directory Access Protocol"),
    entry(443, "HTTPS", "Web server over TLS"),
    entry(445, "SMB", "Windows file sharing"),
    entry(465, "SMTPS", "SMTP over TLS"),
    entry(514, "Syslog", "Remote syslog"),
    entry(515, "LPD", "Line printer daemon"),
    entry(548, "AFP", "Apple Filing Protocol"),
    entry(554, "RTSP", "Real Time Streaming Protocol"),
    entry(587, "Submission", "Mail submission"),
    entry(631, "IPP", "Internet Printing Protocol"),
    entry(636, "LDAPS", "LDAP over TLS"),
    entry(853, "DoT", "DNS over TLS"),
    entry(873, "Rsync", "rsync file synchronization"),
    entry(993, "IMAPS", "IMAP over TLS"),
    entry(995, "POP3S", "POP3 over TLS"),
    entry(1433, "MSSQL", "Microsoft SQL Server"),
    entry(1883, "MQTT", "MQTT message broker"),
    entry(1900, "SSDP", "UPnP discovery"),
    entry(2049, "NFS", "Network File System"),
    entry(2222, "SSH-ALT", "Secure Shell on alternate port"),
    entry(3000, "HTTP-Dev", "Development web server"),
    entry(3306, "MySQL", "MySQL database"),
    entry(3389, "RDP", "Remote Desktop Protocol"),
    entry(5000, "UPnP", "UPnP or development web server"),
    entry(5353, "mDNS", "Multicast DNS"),
    entry(5432, "PostgreSQL", "PostgreSQL database"),
    entry(5900, "VNC", "Virtual Network Computing"),
    entry(6379, "Redis", "Redis key-value store"),
    entry(8000, "HTTP-Alt", "Alternate web server"),
    entry(8080, "HTTP-Proxy", "Alternate web server or proxy"),
    entry(8443, "HTTPS-Alt", "Alternate web server over TLS"),
    entry(8883, "MQTTS", "MQTT over TLS"),
    entry(9000, "HTTP-Admin", "Management web interface"),
    entry(9090, "Prometheus", "Prometheus or management web interface"),
    entry(9100, "JetDirect", "Raw printing"),
    entry(27017, "MongoDB", "MongoDB database"),
    entry(32400, "Plex", "Plex media server"),
];

const fn entry(port: u16, name: &'static str, description: &'static str) -> ServiceInfo {
    ServiceInfo {
        port,
        name,
        description,
    }
}

/// Look up the catalog entry for a port.
pub fn lookup(port: u16) -> Option<&'static ServiceInfo> {
    CATALOG
        .binary_search_by_key(&port, |s| s.port)
        .ok()
        .map(|idx| &CATALOG[idx])
}

/// Service name for a port, [`UNKNOWN_SERVICE`] when the catalog has none.
pub fn service_name(port: u16) -> &'static str {
    lookup(port).map_or(UNKNOWN_SERVICE, |s| s.name)
}

/// Description for a port, empty when the catalog has none.
pub fn description(port: u16) -> &'static str {
    lookup(port).map_or("", |s| s.description)
}
