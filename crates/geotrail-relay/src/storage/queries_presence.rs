//! Device and presence queries.
//!
//! A device row doubles as its presence record: online flag, last-seen time
//! and the latest location snapshot all live on it.

use geotrail_core::db::{DatabaseError, unix_timestamp_millis};

use super::db::TrackingDatabase;
use super::models::{Device, DeviceType, GeoPoint};

/// Parameters for registering a device.
pub struct NewDevice<'a> {
    pub id: &'a str,
    pub device_id: &'a str,
    pub name: &'a str,
    pub device_type: DeviceType,
    pub os: Option<&'a str>,
    pub owner_id: &'a str,
}

/// The current-location overwrite applied on every accepted fix.
#[derive(Debug, Clone)]
pub struct LocationSnapshot {
    pub point: GeoPoint,
    /// `None` or empty keeps the previously stored address.
    pub address: Option<String>,
    pub fix_at: i64,
}

impl TrackingDatabase {
    /// Register a device. Fails with `Conflict` if `device_id` is taken.
    pub async fn create_device(&self, params: &NewDevice<'_>) -> Result<Device, DatabaseError> {
        let now = unix_timestamp_millis();

        sqlx::query(
            "INSERT INTO devices (id, device_id, name, device_type, os, owner_id, last_seen, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(params.id)
        .bind(params.device_id)
        .bind(params.name)
        .bind(params.device_type.as_str())
        .bind(params.os)
        .bind(params.owner_id)
        .bind(now)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.get_device(params.device_id).await
    }

    /// Resolve a device by its external identifier.
    pub async fn find_device_by_external_id(
        &self,
        device_id: &str,
    ) -> Result<Option<Device>, DatabaseError> {
        let device = sqlx::query_as::<_, Device>("SELECT * FROM devices WHERE device_id = ?")
            .bind(device_id)
            .fetch_optional(self.pool())
            .await?;

        Ok(device)
    }

    /// Like [`Self::find_device_by_external_id`] but absence is an error.
    pub async fn get_device(&self, device_id: &str) -> Result<Device, DatabaseError> {
        self.find_device_by_external_id(device_id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Device {device_id}")))
    }

    /// Devices owned by a user, most recently seen first.
    pub async fn list_devices_for_owner(&self, owner_id: &str) -> Result<Vec<Device>, DatabaseError> {
        let devices = sqlx::query_as::<_, Device>(
            "SELECT * FROM devices WHERE owner_id = ? ORDER BY last_seen DESC, device_id ASC",
        )
        .bind(owner_id)
        .fetch_all(self.pool())
        .await?;

        Ok(devices)
    }

    /// Overwrite the current-location snapshot, mark the device online and
    /// refresh `last_seen`.
    pub async fn upsert_current_location(
        &self,
        device_id: &str,
        snapshot: &LocationSnapshot,
    ) -> Result<Device, DatabaseError> {
        let now = unix_timestamp_millis();
        let address = snapshot.address.as_deref().filter(|a| !a.is_empty());

        let result = sqlx::query(
            "UPDATE devices SET current_lng = ?, current_lat = ?, current_address = COALESCE(?, current_address), current_fix_at = ?, is_online = 1, last_seen = ?, updated_at = ? WHERE device_id = ?",
        )
        .bind(snapshot.point.lng)
        .bind(snapshot.point.lat)
        .bind(address)
        .bind(snapshot.fix_at)
        .bind(now)
        .bind(now)
        .bind(device_id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Device {device_id}")));
        }
        self.get_device(device_id).await
    }

    /// Flip every online device whose `last_seen` is older than `cutoff`
    /// (unix millis) to offline, returning the devices that changed.
    pub async fn mark_stale_devices_offline(
        &self,
        cutoff: i64,
    ) -> Result<Vec<Device>, DatabaseError> {
        let devices = sqlx::query_as::<_, Device>(
            "UPDATE devices SET is_online = 0, updated_at = ? WHERE is_online = 1 AND last_seen < ? RETURNING *",
        )
        .bind(unix_timestamp_millis())
        .bind(cutoff)
        .fetch_all(self.pool())
        .await?;

        Ok(devices)
    }

    /// Remove a device. Its ledger rows go with it.
    pub async fn remove_device(&self, device_id: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM devices WHERE device_id = ?")
            .bind(device_id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
