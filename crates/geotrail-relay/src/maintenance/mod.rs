//! Background upkeep: ledger retention and presence timeouts.

mod presence;
mod retention;

pub use presence::{PresenceMonitor, STATUS_OFFLINE};
pub use retention::RetentionSweeper;
