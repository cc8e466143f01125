//! Live-connection gateway: room membership and fan-out.

mod hub;
pub mod protocol;

pub use hub::{ConnectionId, EventHandler, Gateway};
pub use protocol::{Envelope, GatewayError};
