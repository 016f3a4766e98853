//! lanventory-core: shared types for the lanventory network inventory.
//!
//! This crate provides the pieces every other crate agrees on:
//! - Stored rows (Host, Port, HistoryEntry)
//! - Normalized scan records handed from the parser to the reconcilers
//! - Validated scan inputs (target range, port selection)
//! - The static service catalog

pub mod catalog;
pub mod error;
pub mod types;

pub use error::InventoryError;
pub use types::*;
