//! Location ledger queries: append-only fixes with a retention sweep.

use geotrail_core::db::{DatabaseError, unix_timestamp_millis};

use super::db::TrackingDatabase;
use super::models::{GeoPoint, LocationFix};

/// Parameters for appending a fix.
pub struct NewFix<'a> {
    /// Internal id of the reporting device.
    pub device_ref: &'a str,
    /// Owner at write time.
    pub user_id: &'a str,
    pub point: GeoPoint,
    pub address: Option<&'a str>,
    pub accuracy: Option<f64>,
    pub speed: Option<f64>,
    pub altitude: Option<f64>,
    pub recorded_at: i64,
}

impl TrackingDatabase {
    /// Append an immutable fix. Identical input twice yields two rows.
    pub async fn append_fix(&self, fix: &NewFix<'_>) -> Result<LocationFix, DatabaseError> {
        let row = sqlx::query_as::<_, LocationFix>(
            "INSERT INTO location_fixes (device_ref, user_id, lng, lat, address, accuracy, speed, altitude, recorded_at, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING *",
        )
        .bind(fix.device_ref)
        .bind(fix.user_id)
        .bind(fix.point.lng)
        .bind(fix.point.lat)
        .bind(fix.address.unwrap_or_default())
        .bind(fix.accuracy)
        .bind(fix.speed)
        .bind(fix.altitude)
        .bind(fix.recorded_at)
        .bind(unix_timestamp_millis())
        .fetch_one(self.pool())
        .await?;

        Ok(row)
    }

    /// The newest `limit` fixes for a device, returned oldest first.
    pub async fn list_fixes_for_device(
        &self,
        device_ref: &str,
        limit: u32,
    ) -> Result<Vec<LocationFix>, DatabaseError> {
        let fixes = sqlx::query_as::<_, LocationFix>(
            "SELECT * FROM (SELECT * FROM location_fixes WHERE device_ref = ? ORDER BY recorded_at DESC, id DESC LIMIT ?) ORDER BY recorded_at ASC, id ASC",
        )
        .bind(device_ref)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        Ok(fixes)
    }

    /// Count ledger rows for a device.
    pub async fn count_fixes_for_device(&self, device_ref: &str) -> Result<i64, DatabaseError> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM location_fixes WHERE device_ref = ?")
                .bind(device_ref)
                .fetch_one(self.pool())
                .await?;

        Ok(row.0)
    }

    /// Delete fixes created more than `retention_secs` ago.
    pub async fn purge_expired_fixes(&self, retention_secs: i64) -> Result<u64, DatabaseError> {
        let cutoff = unix_timestamp_millis() - retention_secs.saturating_mul(1000);

        let result = sqlx::query("DELETE FROM location_fixes WHERE created_at <= ?")
            .bind(cutoff)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected())
    }
}
