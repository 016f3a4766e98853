//! Nmap process wrapper.
//!
//! Executes nmap as a child process via `tokio::process::Command`, one
//! target address per invocation, and hands the raw output back to the
//! orchestrator. The [`HostScanner`] trait is the seam the orchestrator
//! drives, so tests can substitute canned output.

use std::future::Future;
use std::net::Ipv4Addr;
use std::process::Stdio;

use tokio::process::Command;

use lanventory_core::PortSelection;

use crate::config::DiscoverConfig;
use crate::error::{DiscoverError, Result};

/// Raw result of one scanner invocation.
#[derive(Debug, Clone, Default)]
pub struct ScanOutput {
    /// Exit code; `None` when the process was killed by a signal.
    pub status: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

/// Anything that can probe a single address and return nmap-style XML.
pub trait HostScanner: Send + Sync + 'static {
    fn scan_host(
        &self,
        ip: Ipv4Addr,
        ports: &PortSelection,
    ) -> impl Future<Output = Result<ScanOutput>> + Send;
}

/// Stderr lines nmap prints during normal operation.
const BENIGN_STDERR_PREFIXES: &[&str] = &[
    "Warning:",
    "WARNING:",
    "Note:",
    "mass_dns:",
    "RTTVAR has grown",
    "Increasing send delay",
    "Stats:",
    "NSE:",
];

/// Return the stderr lines that indicate a real failure, if any.
pub fn fatal_stderr(stderr: &str) -> Option<String> {
    let fatal: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !BENIGN_STDERR_PREFIXES.iter().any(|p| line.starts_with(p)))
        .collect();

    if fatal.is_empty() {
        None
    } else {
        Some(fatal.join("\n"))
    }
}

/// Decide whether a finished invocation succeeded.
pub fn check_output(output: &ScanOutput) -> Result<()> {
    match output.status {
        Some(0) => {}
        code => {
            return Err(DiscoverError::NmapFailed {
                code: code.unwrap_or(-1),
                stderr: output.stderr.trim().to_string(),
            })
        }
    }

    if let Some(stderr) = fatal_stderr(&output.stderr) {
        return Err(DiscoverError::NmapFailed { code: 0, stderr });
    }

    Ok(())
}

/// Wrapper around the nmap binary.
pub struct NmapScanner {
    nmap_path: String,
    use_sudo: bool,
    extra_args: Vec<String>,
}

impl NmapScanner {
    pub fn new(nmap_path: &str) -> Self {
        Self {
            nmap_path: nmap_path.to_string(),
            use_sudo: false,
            extra_args: Vec::new(),
        }
    }

    pub fn from_config(config: &DiscoverConfig) -> Self {
        Self {
            nmap_path: config.nmap_path.clone(),
            use_sudo: config.use_sudo,
            extra_args: config.nmap_args.clone(),
        }
    }

    /// Verify nmap is installed and accessible.
    pub async fn verify_installation(&self) -> Result<String> {
        let output = Command::new(&self.nmap_path)
            .arg("--version")
            .output()
            .await
            .map_err(|_| DiscoverError::NmapNotFound {
                path: self.nmap_path.clone(),
            })?;

        String::from_utf8(output.stdout).map_err(|e| DiscoverError::XmlParse(e.to_string()))
    }

    /// Program and arguments for scanning one address.
    pub fn command_line(&self, ip: Ipv4Addr, ports: &PortSelection) -> (String, Vec<String>) {
        let mut args = Vec::new();
        let program = if self.use_sudo {
            args.push("-n".to_string());
            args.push(self.nmap_path.clone());
            "sudo".to_string()
        } else {
            self.nmap_path.clone()
        };

        args.extend(self.extra_args.iter().cloned());
        args.push("-p".to_string());
        args.push(ports.nmap_arg());
        args.push("-oX".to_string());
        args.push("-".to_string());
        args.push("--noninteractive".to_string());
        args.push(ip.to_string());
        (program, args)
    }
}

impl HostScanner for NmapScanner {
    /// Run nmap against one address. XML goes to stdout via `-oX -`.
    ///
    /// The child is killed if the returned future is dropped, which is how
    /// the orchestrator's per-scan timeout abandons a hung process.
    async fn scan_host(&self, ip: Ipv4Addr, ports: &PortSelection) -> Result<ScanOutput> {
        let (program, args) = self.command_line(ip, ports);
        tracing::debug!(ip = %ip, program = %program, args = ?args, "Starting nmap");

        let output = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| DiscoverError::NmapNotFound {
                path: format!("{program}: {e}"),
            })?;

        Ok(ScanOutput {
            status: output.status.code(),
            stdout: output.stdout,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_benign_stderr_is_ignored() {
        let stderr = "Warning: 10.0.0.5 giving up on port because retransmission cap hit (6).\n\
                      mass_dns: warning: Unable to determine any DNS servers.\n\n";
        assert_eq!(fatal_stderr(stderr), None);
        assert_eq!(fatal_stderr(""), None);
    }

    #[test]
    fn test_fatal_stderr_is_reported() {
        let stderr = "Warning: something benign\nFailed to open device eth7\nQUITTING!\n";
        assert_eq!(
            fatal_stderr(stderr).as_deref(),
            Some("Failed to open device eth7\nQUITTING!")
        );
    }

    #[test]
    fn test_check_output() {
        let ok = ScanOutput {
            status: Some(0),
            stdout: b"<nmaprun/>".to_vec(),
            stderr: "Warning: benign\n".to_string(),
        };
        assert!(check_output(&ok).is_ok());

        let exit = ScanOutput {
            status: Some(1),
            stderr: "You requested a scan type which requires root privileges.\n".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            check_output(&exit),
            Err(DiscoverError::NmapFailed { code: 1, .. })
        ));

        let killed = ScanOutput {
            status: None,
            ..Default::default()
        };
        assert!(matches!(
            check_output(&killed),
            Err(DiscoverError::NmapFailed { code: -1, .. })
        ));

        let noisy = ScanOutput {
            status: Some(0),
            stderr: "dnet: Failed to open device wlan0\n".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            check_output(&noisy),
            Err(DiscoverError::NmapFailed { code: 0, .. })
        ));
    }

    #[test]
    fn test_command_line() {
        let scanner = NmapScanner {
            nmap_path: "/usr/bin/nmap".to_string(),
            use_sudo: false,
            extra_args: vec!["-T4".to_string(), "-R".to_string()],
        };
        let (program, args) =
            scanner.command_line(Ipv4Addr::new(10, 0, 0, 5), &PortSelection::default());
        assert_eq!(program, "/usr/bin/nmap");
        assert_eq!(
            args,
            vec!["-T4", "-R", "-p", "22,2222", "-oX", "-", "--noninteractive", "10.0.0.5"]
        );
    }

    #[test]
    fn test_command_line_with_sudo_and_all_ports() {
        let scanner = NmapScanner {
            nmap_path: "nmap".to_string(),
            use_sudo: true,
            extra_args: Vec::new(),
        };
        let (program, args) = scanner.command_line(Ipv4Addr::new(10, 0, 0, 5), &PortSelection::All);
        assert_eq!(program, "sudo");
        assert_eq!(&args[..2], &["-n", "nmap"]);
        assert!(args.windows(2).any(|w| w == ["-p", "1-65535"]));
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let scanner = NmapScanner::new("/nonexistent/lanventory-nmap");
        let err = scanner
            .scan_host(Ipv4Addr::LOCALHOST, &PortSelection::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoverError::NmapNotFound { .. }));
    }
}
