//! Validate, persist, update presence, then fan out.

use std::sync::{Arc, Weak};

use futures_util::future::BoxFuture;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use geotrail_core::db::unix_timestamp_millis;

use crate::gateway::{ConnectionId, Gateway};
use crate::gateway::protocol::{DEVICE_LOCATION_UPDATE, LOCATION_UPDATED};
use crate::storage::{Device, LocationFix, LocationSnapshot, NewFix, TrackingDatabase};

use super::{LocationUpdate, RelayError};

/// What a successful update produced.
#[derive(Debug)]
pub struct RelayOutcome {
    pub fix: LocationFix,
    pub device: Device,
    /// Queues reached through the sender's room.
    pub room_deliveries: usize,
    /// Queues reached through the global broadcast.
    pub global_deliveries: usize,
}

/// The inbound handler for device location updates.
pub struct LocationRelay {
    db: TrackingDatabase,
    gateway: Arc<Gateway>,
}

impl LocationRelay {
    pub const fn new(db: TrackingDatabase, gateway: Arc<Gateway>) -> Self {
        Self { db, gateway }
    }

    /// Route `device_location_update` frames from the gateway to this relay.
    ///
    /// The gateway only holds a weak reference, so dropping the relay
    /// silently detaches it.
    pub async fn attach(self: &Arc<Self>) {
        let relay: Weak<Self> = Arc::downgrade(self);
        self.gateway
            .on(
                DEVICE_LOCATION_UPDATE,
                Arc::new(
                    move |conn_id: ConnectionId, data: Value| -> BoxFuture<'static, ()> {
                        let relay = relay.clone();
                        Box::pin(async move {
                            if let Some(relay) = relay.upgrade() {
                                relay.handle_event(&conn_id, data).await;
                            }
                        })
                    },
                ),
            )
            .await;
    }

    /// Handler boundary: every failure is logged and swallowed. The sender
    /// gets no acknowledgement either way.
    pub async fn handle_event(&self, conn_id: &str, raw: Value) {
        match self.handle_location_update(raw).await {
            Ok(outcome) => debug!(
                conn_id = %conn_id,
                device_id = %outcome.device.device_id,
                fix_id = outcome.fix.id,
                room_deliveries = outcome.room_deliveries,
                global_deliveries = outcome.global_deliveries,
                "Location update relayed"
            ),
            Err(e) => {
                match &e {
                    RelayError::Persistence(_) => {
                        error!(conn_id = %conn_id, error = %e, "Failed to persist location update");
                    }
                    RelayError::Validation(_) | RelayError::DeviceNotFound(_) => {
                        warn!(conn_id = %conn_id, error = %e, "Rejected location update");
                    }
                }
                #[cfg(feature = "metrics")]
                crate::metrics::record_relay_failure(e.kind());
            }
        }
    }

    /// Accept one fix. Nothing is broadcast unless both writes succeed.
    ///
    /// The ledger append and the presence overwrite are separate statements.
    /// Two concurrent fixes for the same device both land in the ledger, but
    /// the snapshot keeps whichever overwrite finished last.
    pub async fn handle_location_update(&self, raw: Value) -> Result<RelayOutcome, RelayError> {
        let update = LocationUpdate::from_value(&raw)?;

        let device = self
            .db
            .find_device_by_external_id(&update.device_id)
            .await?
            .ok_or_else(|| RelayError::DeviceNotFound(update.device_id.clone()))?;

        let recorded_at = unix_timestamp_millis();
        let fix = self
            .db
            .append_fix(&NewFix {
                device_ref: &device.id,
                user_id: &device.owner_id,
                point: update.coordinates,
                address: update.address.as_deref(),
                accuracy: update.accuracy,
                speed: update.speed,
                altitude: update.altitude,
                recorded_at,
            })
            .await?;

        let device = self
            .db
            .upsert_current_location(
                &device.device_id,
                &LocationSnapshot {
                    point: update.coordinates,
                    address: update.address.clone(),
                    fix_at: recorded_at,
                },
            )
            .await?;

        #[cfg(feature = "metrics")]
        crate::metrics::record_fix_persisted();

        info!(
            device_id = %device.device_id,
            owner_id = %device.owner_id,
            lat = update.coordinates.lat,
            lng = update.coordinates.lng,
            "Location fix stored"
        );

        let room_deliveries = match update.room() {
            Some(room) => {
                self.gateway
                    .broadcast_to_room(room, LOCATION_UPDATED, &raw)
                    .await
            }
            None => 0,
        };
        let global_deliveries = self.gateway.broadcast_to_all(LOCATION_UPDATED, &raw).await;

        Ok(RelayOutcome {
            fix,
            device,
            room_deliveries,
            global_deliveries,
        })
    }
}
