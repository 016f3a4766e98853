use thiserror::Error;

/// Validation errors for scan inputs shared across lanventory crates.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InventoryError {
    #[error("Invalid scan target: {0}")]
    InvalidTarget(String),

    #[error("Invalid port selection: {0}")]
    InvalidPorts(String),
}
