//! Location relay: the inbound handler for device fixes.

mod service;
mod update;


pub use service::{LocationRelay, RelayOutcome};
pub use update::LocationUpdate;

use crate::storage::DatabaseError;

/// Why a location update was dropped.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Malformed identifier or coordinates. Raised before any store is touched.
    #[error("invalid location update: {0}")]
    Validation(String),

    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// A ledger or presence write failed. Earlier writes are not rolled back.
    #[error("persistence failure: {0}")]
    Persistence(#[from] DatabaseError),
}

impl RelayError {
    /// Short label for logs and metrics.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::DeviceNotFound(_) => "device_not_found",
            Self::Persistence(_) => "persistence",
        }
    }
}
