//! Configuration for the lanventory discovery engine.

use std::time::Duration;

use serde::Deserialize;

use lanventory_core::{InventoryError, PortSelection, ScanTarget, DEFAULT_PORTS};

/// Top-level discover configuration.
///
/// Loaded from the `lanventory.toml` `[discover]` section or
/// `LANVENTORY_DISCOVER__` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoverConfig {
    /// Path to the nmap binary (default: "nmap").
    #[serde(default = "default_nmap_path")]
    pub nmap_path: String,

    /// Run nmap through `sudo -n` for raw-socket scans.
    #[serde(default)]
    pub use_sudo: bool,

    /// Flags passed to nmap ahead of the port list and address.
    #[serde(default = "default_nmap_args")]
    pub nmap_args: Vec<String>,

    /// Per-address scan budget; the nmap process is killed past it.
    #[serde(default = "default_scan_timeout")]
    pub scan_timeout_secs: u64,

    /// Budget for each reverse-DNS or ARP lookup.
    #[serde(default = "default_resolver_timeout")]
    pub resolver_timeout_ms: u64,

    /// Maximum concurrent nmap processes.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_scans: usize,

    /// Ranges scanned by the daemon.
    #[serde(default)]
    pub targets: Vec<TargetSchedule>,
}

/// A scan range with its schedule.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetSchedule {
    /// CIDR target (e.g., "192.168.2.0/24").
    pub cidr: String,

    /// Human-readable name for this range.
    pub name: Option<String>,

    /// Ports to probe (default: 22, 2222).
    #[serde(default = "default_ports")]
    pub ports: Vec<u16>,

    /// Probe 1-65535 instead of `ports`.
    #[serde(default)]
    pub all_ports: bool,

    /// Scan interval in seconds (default: 90 minutes).
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Whether this range is enabled for scanning.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl TargetSchedule {
    pub fn scan_target(&self) -> Result<ScanTarget, InventoryError> {
        ScanTarget::parse(&self.cidr)
    }

    pub fn port_selection(&self) -> Result<PortSelection, InventoryError> {
        if self.all_ports {
            Ok(PortSelection::All)
        } else {
            PortSelection::list(self.ports.iter().copied())
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.cidr)
    }
}

impl DiscoverConfig {
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }

    pub fn resolver_timeout(&self) -> Duration {
        Duration::from_millis(self.resolver_timeout_ms)
    }

    /// Check every enabled target up front so a bad range or port list
    /// fails before any scan starts.
    pub fn validate(&self) -> Result<(), InventoryError> {
        for target in self.targets.iter().filter(|t| t.enabled) {
            target.scan_target()?;
            target.port_selection()?;
        }
        Ok(())
    }
}

fn default_nmap_path() -> String {
    "nmap".to_string()
}

fn default_nmap_args() -> Vec<String> {
    ["-T4", "-A", "-R", "--system-dns"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_scan_timeout() -> u64 {
    300
}

fn default_resolver_timeout() -> u64 {
    1_000
}

fn default_max_concurrent() -> usize {
    4
}

fn default_ports() -> Vec<u16> {
    DEFAULT_PORTS.to_vec()
}

fn default_interval() -> u64 {
    5_400
}

fn default_true() -> bool {
    true
}

impl Default for DiscoverConfig {
    fn default() -> Self {
        Self {
            nmap_path: default_nmap_path(),
            use_sudo: false,
            nmap_args: default_nmap_args(),
            scan_timeout_secs: default_scan_timeout(),
            resolver_timeout_ms: default_resolver_timeout(),
            max_concurrent_scans: default_max_concurrent(),
            targets: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DiscoverConfig::default();
        assert_eq!(config.nmap_path, "nmap");
        assert_eq!(config.nmap_args, vec!["-T4", "-A", "-R", "--system-dns"]);
        assert_eq!(config.scan_timeout(), Duration::from_secs(300));
        assert_eq!(config.resolver_timeout(), Duration::from_millis(1000));
        assert_eq!(config.max_concurrent_scans, 4);
        assert!(!config.use_sudo);
    }

    #[test]
    fn test_target_defaults_from_toml() {
        let raw = r#"
            [[targets]]
            cidr = "192.168.2.0/24"

            [[targets]]
            cidr = "10.0.0.0/28"
            name = "lab"
            all_ports = true
            interval_secs = 600
            enabled = false
        "#;
        let cfg: DiscoverConfig = ::config::Config::builder()
            .add_source(::config::File::from_str(raw, ::config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        let home = &cfg.targets[0];
        assert_eq!(home.ports, vec![22, 2222]);
        assert_eq!(home.interval(), Duration::from_secs(5400));
        assert!(home.enabled);
        assert_eq!(home.label(), "192.168.2.0/24");
        assert_eq!(home.port_selection().unwrap(), PortSelection::default());

        let lab = &cfg.targets[1];
        assert_eq!(lab.label(), "lab");
        assert_eq!(lab.port_selection().unwrap(), PortSelection::All);
        assert!(!lab.enabled);
    }

    #[test]
    fn test_validate_rejects_bad_targets() {
        let mut config = DiscoverConfig::default();
        config.targets.push(TargetSchedule {
            cidr: "10.0.0.0/33".to_string(),
            name: None,
            ports: default_ports(),
            all_ports: false,
            interval_secs: 60,
            enabled: true,
        });
        assert!(matches!(config.validate(), Err(InventoryError::InvalidTarget(_))));

        config.targets[0].cidr = "10.0.0.0/24".to_string();
        config.targets[0].ports = Vec::new();
        assert!(matches!(config.validate(), Err(InventoryError::InvalidPorts(_))));

        config.targets[0].enabled = false;
        assert!(config.validate().is_ok());
    }
}
