//! Wire envelope shared by every live-channel frame.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Inbound: a device reports a fix.
pub const DEVICE_LOCATION_UPDATE: &str = "device_location_update";
/// Outbound: a fix was accepted.
pub const LOCATION_UPDATED: &str = "location_updated";
/// Outbound: a device changed presence.
pub const DEVICE_STATUS: &str = "device_status";
/// Inbound: subscribe to a user's room.
pub const JOIN_USER_ROOM: &str = "join_user_room";
/// Inbound: unsubscribe from a user's room.
pub const LEAVE_USER_ROOM: &str = "leave_user_room";

/// `{ "event": ..., "data": ... }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Parse a text frame.
    pub fn parse(text: &str) -> Result<Self, GatewayError> {
        let envelope: Self =
            serde_json::from_str(text).map_err(|e| GatewayError::MalformedFrame(e.to_string()))?;
        if envelope.event.is_empty() {
            return Err(GatewayError::MalformedFrame("empty event name".into()));
        }
        Ok(envelope)
    }

    pub fn to_text(&self) -> Result<String, GatewayError> {
        serde_json::to_string(self).map_err(|e| GatewayError::Encode(e.to_string()))
    }
}

/// Errors raised while handling live-channel frames. None of them reach the
/// peer; the connection stays open.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("invalid payload for {event}: {reason}")]
    InvalidPayload { event: String, reason: String },

    #[error("failed to encode frame: {0}")]
    Encode(String),
}
