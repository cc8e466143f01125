//! Presence timeout: devices that stop reporting go offline.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use geotrail_core::db::unix_timestamp_millis;

use crate::gateway::Gateway;
use crate::storage::{DatabaseError, Device, TrackingDatabase};

/// Status string sent in `device_status` when a device times out.
pub const STATUS_OFFLINE: &str = "offline";

/// Marks silent devices offline and tells their owners.
#[derive(Clone)]
pub struct PresenceMonitor {
    db: TrackingDatabase,
    gateway: Arc<Gateway>,
    offline_after_secs: i64,
}

impl PresenceMonitor {
    pub const fn new(db: TrackingDatabase, gateway: Arc<Gateway>, offline_after_secs: i64) -> Self {
        Self {
            db,
            gateway,
            offline_after_secs,
        }
    }

    /// Run one check. Returns the devices that transitioned to offline.
    pub async fn check(&self) -> Result<Vec<Device>, DatabaseError> {
        let cutoff = unix_timestamp_millis() - self.offline_after_secs.saturating_mul(1000);
        let stale = self.db.mark_stale_devices_offline(cutoff).await?;

        for device in &stale {
            info!(
                device_id = %device.device_id,
                owner_id = %device.owner_id,
                last_seen = device.last_seen,
                "Device went offline"
            );
            self.gateway
                .emit_device_status(&device.owner_id, &device.device_id, STATUS_OFFLINE)
                .await;
        }
        Ok(stale)
    }

    pub fn spawn(self, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(e) = self.check().await {
                    warn!(error = %e, "Presence check failed");
                }
            }
        })
    }
}
