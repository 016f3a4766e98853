//! lanventory-store: SQLite store for the live network inventory.
//!
//! This crate is the single mutation point for the hosts, ports and history
//! tables. Every read and write flows through [`InventoryDb`] so the
//! host/port reference invariant and the upsert keys are enforced in one
//! place.

pub mod client;
pub mod mutations;
pub mod queries;
mod schema;

pub use client::{InventoryDb, InventoryTxn, StoreConfig, StoreError};
pub use mutations::{HostUpsert, PortUpsert};
