//! Data models for Geotrail storage.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Token {
    pub id: String,
    pub user_id: String,
    pub token_hash: String,
    pub expires_at: i64,
    pub revoked: i64,
    pub created_at: i64,
}

/// Kind of hardware a device reports itself as.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum DeviceType {
    #[default]
    Mobile,
    Tablet,
    Other,
}

impl DeviceType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mobile => "mobile",
            Self::Tablet => "tablet",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mobile" => Ok(Self::Mobile),
            "tablet" => Ok(Self::Tablet),
            "other" => Ok(Self::Other),
            other => Err(format!("unknown device type: {other}")),
        }
    }
}

/// A device and its presence record. Times are unix milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Device {
    /// Internal row id.
    pub id: String,
    /// Externally supplied identifier, unique across the system.
    pub device_id: String,
    pub name: String,
    pub device_type: DeviceType,
    pub os: Option<String>,
    pub owner_id: String,
    pub is_active: bool,
    pub is_online: bool,
    pub last_seen: i64,
    pub current_lng: Option<f64>,
    pub current_lat: Option<f64>,
    pub current_address: String,
    pub current_fix_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Device {
    /// Latest known position, if the device ever reported one.
    pub fn current_point(&self) -> Option<GeoPoint> {
        match (self.current_lat, self.current_lng) {
            (Some(lat), Some(lng)) => Some(GeoPoint { lat, lng }),
            _ => None,
        }
    }
}

/// One immutable ledger row. Times are unix milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LocationFix {
    pub id: i64,
    pub device_ref: String,
    pub user_id: String,
    pub lng: f64,
    pub lat: f64,
    pub address: String,
    pub accuracy: Option<f64>,
    pub speed: Option<f64>,
    pub altitude: Option<f64>,
    pub recorded_at: i64,
    pub created_at: i64,
}

impl LocationFix {
    pub const fn point(&self) -> GeoPoint {
        GeoPoint {
            lat: self.lat,
            lng: self.lng,
        }
    }
}

/// WGS84 position as reported by devices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    /// Whether both axes are finite and inside their valid ranges.
    pub fn is_valid(self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// `[lng, lat]`, the GeoJSON axis order.
    pub const fn lng_lat(self) -> [f64; 2] {
        [self.lng, self.lat]
    }
}
