//! Inbound `device_location_update` payload.

use serde::Deserialize;
use serde_json::Value;

use crate::storage::GeoPoint;

use super::RelayError;

/// A fix as reported by a device.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdate {
    pub device_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub coordinates: GeoPoint,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub accuracy: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub altitude: Option<f64>,
}

impl LocationUpdate {
    /// Decode and validate a raw event payload.
    pub fn from_value(raw: &Value) -> Result<Self, RelayError> {
        let update = Self::deserialize(raw).map_err(|e| RelayError::Validation(e.to_string()))?;
        update.validate()?;
        Ok(update)
    }

    fn validate(&self) -> Result<(), RelayError> {
        if self.device_id.trim().is_empty() {
            return Err(RelayError::Validation("deviceId must not be empty".into()));
        }
        if !self.coordinates.is_valid() {
            return Err(RelayError::Validation(format!(
                "coordinates out of range: lat={} lng={}",
                self.coordinates.lat, self.coordinates.lng
            )));
        }
        for (name, value) in [
            ("accuracy", self.accuracy),
            ("speed", self.speed),
            ("altitude", self.altitude),
        ] {
            if value.is_some_and(|v| !v.is_finite()) {
                return Err(RelayError::Validation(format!("{name} must be finite")));
            }
        }
        Ok(())
    }

    /// The room to target first, if the sender named one.
    pub fn room(&self) -> Option<&str> {
        self.user_id.as_deref().filter(|id| !id.is_empty())
    }
}
