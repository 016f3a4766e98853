//! lanventory-discover: LAN discovery and inventory reconciliation.
//!
//! Wraps nmap to probe every address of a range, merges what it finds into
//! the SQLite inventory, and moves hosts that stopped answering to history.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod nmap_xml;
pub mod orchestrator;
pub mod reconcile;
pub mod resolve;
pub mod scanner;
pub mod scheduler;

pub use error::{DiscoverError, LookupError};
pub use orchestrator::{CycleReport, Orchestrator};
