//! CLI entry point for the lanventory discovery engine.

use std::net::Ipv4Addr;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use lanventory_core::{PortSelection, ScanTarget};
use lanventory_store::{InventoryDb, StoreConfig};

use lanventory_discover::config::DiscoverConfig;
use lanventory_discover::orchestrator::Orchestrator;
use lanventory_discover::reconcile::HostReconciler;
use lanventory_discover::resolve::Resolvers;
use lanventory_discover::scanner::NmapScanner;
use lanventory_discover::scheduler::ScanScheduler;

#[derive(Parser)]
#[command(name = "lanventory")]
#[command(about = "LAN discovery and inventory reconciliation engine")]
struct Cli {
    /// Config file prefix (default: lanventory).
    #[arg(short, long, default_value = "lanventory", global = true)]
    config: String,

    /// Override the inventory database path.
    #[arg(long, global = true)]
    db: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a single scan cycle over a range and print its report.
    Scan {
        /// Target to scan (CIDR notation, e.g., 192.168.2.0/24).
        #[arg(short, long)]
        target: String,

        /// Comma-separated ports to probe (default: 22,2222).
        #[arg(short, long, conflicts_with = "all_ports")]
        ports: Option<String>,

        /// Probe every port from 1 to 65535.
        #[arg(long)]
        all_ports: bool,
    },

    /// Run scheduled scans for every enabled target in the config.
    Daemon,

    /// Reverse-DNS lookup for one or more addresses.
    Dns {
        /// Comma-separated IPv4 addresses.
        ips: String,
    },

    /// Neighbor-table lookup for one or more addresses.
    Arp {
        /// Comma-separated IPv4 addresses.
        ips: String,
    },

    /// List the live inventory.
    Hosts {
        #[arg(long)]
        json: bool,
    },

    /// List archived hosts.
    History {
        #[arg(long)]
        json: bool,
    },

    /// Mark a host as known so it is never archived.
    Known {
        ip: String,

        /// Clear the flag instead of setting it.
        #[arg(long)]
        unset: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    let (discover_config, mut store_config) = load_config(&cli.config)?;
    if let Some(path) = &cli.db {
        store_config.path = path.clone();
    }

    match cli.command {
        Command::Scan {
            target,
            ports,
            all_ports,
        } => {
            // Bad input fails before anything touches the network.
            let target = ScanTarget::parse(&target)?;
            let ports = match (all_ports, ports) {
                (true, _) => PortSelection::All,
                (false, Some(list)) => PortSelection::parse(&list)?,
                (false, None) => PortSelection::default(),
            };

            let orchestrator = build_orchestrator(&discover_config, &store_config).await?;
            let report = orchestrator.run_cycle(&target, &ports).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Daemon => {
            discover_config.validate()?;
            if discover_config.targets.is_empty() {
                anyhow::bail!("No targets configured: add [[discover.targets]] to the config");
            }
            let orchestrator = build_orchestrator(&discover_config, &store_config).await?;
            let scheduler = ScanScheduler::new(discover_config, orchestrator);
            scheduler.run().await?;
        }
        Command::Dns { ips } => {
            let ips = parse_ips(&ips)?;
            let resolvers = Resolvers::system(discover_config.resolver_timeout());
            let names = resolvers.reverse_lookup(&ips).await?;
            for (ip, name) in ips.iter().zip(names) {
                println!("{ip}\t{name}");
            }
        }
        Command::Arp { ips } => {
            let ips = parse_ips(&ips)?;
            let resolvers = Resolvers::system(discover_config.resolver_timeout());
            let macs = resolvers.arp_lookup(&ips).await?;
            for (ip, mac) in ips.iter().zip(macs) {
                println!("{ip}\t{mac}");
            }
        }
        Command::Hosts { json } => {
            let db = InventoryDb::open(&store_config)?;
            let hosts = db.list_hosts()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&hosts)?);
            } else {
                for host in hosts {
                    let ports = db
                        .list_ports(host.id)?
                        .iter()
                        .map(|p| format!("{}/{}", p.port, p.protocol))
                        .collect::<Vec<_>>()
                        .join(",");
                    println!(
                        "{}\t{}\t{}\tknown={}\tactive={}\t{}\t{}",
                        host.ip,
                        host.name,
                        host.mac.as_deref().unwrap_or("-"),
                        host.known,
                        host.active,
                        host.last_seen.to_rfc3339(),
                        ports
                    );
                }
            }
        }
        Command::History { json } => {
            let db = InventoryDb::open(&store_config)?;
            let history = db.list_history()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&history)?);
            } else {
                for entry in history {
                    println!(
                        "{}\t{}\t{}\tlast_seen={}\tarchived_at={}",
                        entry.ip,
                        entry.name,
                        entry.mac.as_deref().unwrap_or("-"),
                        entry.last_seen.to_rfc3339(),
                        entry.archived_at.to_rfc3339()
                    );
                }
            }
        }
        Command::Known { ip, unset } => {
            let db = InventoryDb::open(&store_config)?;
            let host = db.set_known(&ip, !unset)?;
            tracing::info!(ip = %host.ip, known = host.known, "Known flag updated");
            println!("{}\tknown={}", host.ip, host.known);
        }
    }

    Ok(())
}

/// Open the store, verify nmap and wire up the scan pipeline.
async fn build_orchestrator(
    discover: &DiscoverConfig,
    store: &StoreConfig,
) -> anyhow::Result<Orchestrator<NmapScanner>> {
    let db = InventoryDb::open(store).with_context(|| format!("opening {}", store.path))?;

    let scanner = NmapScanner::from_config(discover);
    let version = scanner.verify_installation().await?;
    tracing::info!(
        nmap_version = %version.lines().next().unwrap_or_default().trim(),
        "Nmap verified"
    );

    let resolvers = Resolvers::system(discover.resolver_timeout());
    let reconciler = HostReconciler::new(db, resolvers);
    Ok(Orchestrator::from_config(scanner, reconciler, discover))
}

fn parse_ips(raw: &str) -> anyhow::Result<Vec<Ipv4Addr>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<Ipv4Addr>()
                .with_context(|| format!("invalid IPv4 address: {s}"))
        })
        .collect()
}

/// Layer defaults, the optional config file and `LANVENTORY_<SECTION>__<KEY>`
/// environment variables.
fn load_config(file_prefix: &str) -> anyhow::Result<(DiscoverConfig, StoreConfig)> {
    let cfg = config::Config::builder()
        .add_source(config::File::with_name(file_prefix).required(false))
        .add_source(
            config::Environment::with_prefix("LANVENTORY")
                .prefix_separator("_")
                .separator("__")
                .list_separator(" ")
                .with_list_parse_key("discover.nmap_args")
                .try_parsing(true),
        )
        .build()?;

    let discover = section(&cfg, "discover")?;
    let store = section(&cfg, "store")?;
    Ok((discover, store))
}

fn section<T>(cfg: &config::Config, key: &str) -> anyhow::Result<T>
where
    T: serde::de::DeserializeOwned + Default,
{
    match cfg.get::<T>(key) {
        Ok(value) => Ok(value),
        Err(config::ConfigError::NotFound(_)) => Ok(T::default()),
        Err(e) => Err(e).with_context(|| format!("invalid [{key}] configuration")),
    }
}
