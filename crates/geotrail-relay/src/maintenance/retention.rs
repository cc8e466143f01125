//! Ledger retention sweep.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::storage::{DatabaseError, TrackingDatabase};

/// Deletes ledger fixes older than the retention window.
#[derive(Clone)]
pub struct RetentionSweeper {
    db: TrackingDatabase,
    retention_secs: i64,
}

impl RetentionSweeper {
    pub const fn new(db: TrackingDatabase, retention_secs: i64) -> Self {
        Self { db, retention_secs }
    }

    /// Run one sweep and return how many fixes were removed.
    pub async fn sweep(&self) -> Result<u64, DatabaseError> {
        let removed = self.db.purge_expired_fixes(self.retention_secs).await?;
        if removed > 0 {
            info!(
                removed,
                retention_secs = self.retention_secs,
                "Purged expired location fixes"
            );
        }
        Ok(removed)
    }

    /// Sweep every `period` until the runtime shuts down. The first sweep
    /// happens one period after startup.
    pub fn spawn(self, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(e) = self.sweep().await {
                    warn!(error = %e, "Retention sweep failed");
                }
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::storage::{DeviceType, GeoPoint, NewDevice, NewFix};

    async fn seeded() -> TrackingDatabase {
        let db = TrackingDatabase::open_in_memory().await.unwrap();
        db.create_user("u1", "u1@example.com", "U", "One", "h")
            .await
            .unwrap();
        db.create_device(&NewDevice {
            id: "row-1",
            device_id: "dev-1",
            name: "Phone",
            device_type: DeviceType::Mobile,
            os: None,
            owner_id: "u1",
        })
        .await
        .unwrap();
        db.append_fix(&NewFix {
            device_ref: "row-1",
            user_id: "u1",
            point: GeoPoint { lat: 1.0, lng: 1.0 },
            address: None,
            accuracy: None,
            speed: None,
            altitude: None,
            recorded_at: 0,
        })
        .await
        .unwrap();
        db
    }

    #[tokio::test]
    async fn fresh_fixes_survive_sweep() {
        let db = seeded().await;
        let sweeper = RetentionSweeper::new(db.clone(), 172_800);

        assert_eq!(sweeper.sweep().await.unwrap(), 0);
        assert_eq!(db.count_fixes_for_device("row-1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn expired_fixes_are_removed() {
        let db = seeded().await;
        sqlx::query("UPDATE location_fixes SET created_at = created_at - 172801000")
            .execute(db.pool())
            .await
            .unwrap();

        let sweeper = RetentionSweeper::new(db.clone(), 172_800);
        assert_eq!(sweeper.sweep().await.unwrap(), 1);
        assert_eq!(db.count_fixes_for_device("row-1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn spawned_task_sweeps_after_first_period() {
        let db = seeded().await;
        sqlx::query("UPDATE location_fixes SET created_at = 0")
            .execute(db.pool())
            .await
            .unwrap();

        let handle = RetentionSweeper::new(db.clone(), 60).spawn(Duration::from_millis(20));
        for _ in 0..100 {
            if db.count_fixes_for_device("row-1").await.unwrap() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();
        assert_eq!(db.count_fixes_for_device("row-1").await.unwrap(), 0);
    }
}
