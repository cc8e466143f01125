//! Room-scoped fan-out over live connections.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::{Value, json};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};

use geotrail_core::db::unix_timestamp_millis;

use super::protocol::{DEVICE_STATUS, Envelope, GatewayError, JOIN_USER_ROOM, LEAVE_USER_ROOM};

/// Identifies one physical connection for its whole lifetime.
pub type ConnectionId = String;

/// Handler for a named inbound event. Invoked with the sending connection
/// and the frame's `data`.
pub type EventHandler = Arc<dyn Fn(ConnectionId, Value) -> BoxFuture<'static, ()> + Send + Sync>;

type Target = (ConnectionId, mpsc::Sender<Envelope>);

struct ConnectionEntry {
    tx: mpsc::Sender<Envelope>,
    rooms: HashSet<String>,
}

#[derive(Default)]
struct Membership {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    rooms: HashMap<String, HashSet<ConnectionId>>,
}

/// Live connection table plus room membership.
///
/// Constructed once at startup and handed to everything that broadcasts.
pub struct Gateway {
    membership: RwLock<Membership>,
    handlers: RwLock<HashMap<String, EventHandler>>,
}

impl Gateway {
    pub fn new() -> Self {
        Self {
            membership: RwLock::new(Membership::default()),
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a handler for an inbound event name, replacing any previous one.
    pub async fn on(&self, event: &str, handler: EventHandler) {
        self.handlers.write().await.insert(event.to_string(), handler);
    }

    /// Track a new connection whose outbound frames go to `tx`.
    pub async fn connect(&self, tx: mpsc::Sender<Envelope>) -> ConnectionId {
        let conn_id = uuid::Uuid::new_v4().to_string();
        self.membership.write().await.connections.insert(
            conn_id.clone(),
            ConnectionEntry {
                tx,
                rooms: HashSet::new(),
            },
        );
        debug!(conn_id = %conn_id, "Connection registered");
        conn_id
    }

    /// Add a connection to a room. Returns `false` if it was already a
    /// member or the connection is unknown.
    pub async fn join(&self, conn_id: &str, room: &str) -> bool {
        let mut guard = self.membership.write().await;
        let state = &mut *guard;
        let Some(entry) = state.connections.get_mut(conn_id) else {
            warn!(conn_id = %conn_id, room = %room, "Join from unknown connection");
            return false;
        };
        if !entry.rooms.insert(room.to_string()) {
            return false;
        }
        state
            .rooms
            .entry(room.to_string())
            .or_default()
            .insert(conn_id.to_string());
        info!(conn_id = %conn_id, room = %room, "Joined room");
        true
    }

    /// Remove a connection from a room. Empty rooms are dropped.
    pub async fn leave(&self, conn_id: &str, room: &str) -> bool {
        let mut guard = self.membership.write().await;
        let state = &mut *guard;
        let removed = state
            .connections
            .get_mut(conn_id)
            .is_some_and(|entry| entry.rooms.remove(room));
        if !removed {
            return false;
        }
        remove_member(&mut state.rooms, room, conn_id);
        info!(conn_id = %conn_id, room = %room, "Left room");
        true
    }

    /// Forget a connection and every room it was in. Safe to call more than
    /// once; only the first call has an effect.
    pub async fn on_disconnect(&self, conn_id: &str) -> bool {
        let mut guard = self.membership.write().await;
        let state = &mut *guard;
        let Some(entry) = state.connections.remove(conn_id) else {
            return false;
        };
        for room in &entry.rooms {
            remove_member(&mut state.rooms, room, conn_id);
        }
        info!(conn_id = %conn_id, rooms = entry.rooms.len(), "Connection closed");
        true
    }

    /// Deliver to every member of `room`. Returns how many queues accepted it.
    pub async fn broadcast_to_room(&self, room: &str, event: &str, payload: &Value) -> usize {
        let targets: Vec<Target> = {
            let state = self.membership.read().await;
            state
                .rooms
                .get(room)
                .into_iter()
                .flatten()
                .filter_map(|id| state.connections.get(id).map(|c| (id.clone(), c.tx.clone())))
                .collect()
        };
        self.deliver(targets, event, payload).await
    }

    /// Deliver to every live connection regardless of room.
    pub async fn broadcast_to_all(&self, event: &str, payload: &Value) -> usize {
        let targets: Vec<Target> = self
            .membership
            .read()
            .await
            .connections
            .iter()
            .map(|(id, c)| (id.clone(), c.tx.clone()))
            .collect();
        self.deliver(targets, event, payload).await
    }

    /// Tell a user's room that one of their devices changed presence.
    pub async fn emit_device_status(&self, user_id: &str, device_id: &str, status: &str) -> usize {
        let payload = json!({
            "deviceId": device_id,
            "status": status,
            "timestamp": unix_timestamp_millis(),
        });
        self.broadcast_to_room(user_id, DEVICE_STATUS, &payload).await
    }

    /// Inbound entry point. Room control is handled here; everything else
    /// goes to the handler registered for the event name.
    pub async fn receive_event(&self, conn_id: &str, event: &str, data: Value) {
        match event {
            JOIN_USER_ROOM | LEAVE_USER_ROOM => match room_id(event, &data) {
                Ok(room) if event == JOIN_USER_ROOM => {
                    self.join(conn_id, room).await;
                }
                Ok(room) => {
                    self.leave(conn_id, room).await;
                }
                Err(e) => warn!(conn_id = %conn_id, error = %e, "Ignoring room request"),
            },
            _ => {
                let handler = self.handlers.read().await.get(event).cloned();
                match handler {
                    Some(handler) => handler(conn_id.to_string(), data).await,
                    None => debug!(conn_id = %conn_id, event = %event, "No handler for event"),
                }
            }
        }
    }

    /// Queue one frame per target without waiting. A full queue means the
    /// peer stopped reading: the connection is dropped from the gateway,
    /// which closes its queue and ends its writer. Closed queues are skipped.
    async fn deliver(&self, targets: Vec<Target>, event: &str, payload: &Value) -> usize {
        let mut delivered = 0;
        let mut stalled = Vec::new();
        for (conn_id, tx) in targets {
            match tx.try_send(Envelope::new(event, payload.clone())) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => stalled.push(conn_id),
                Err(TrySendError::Closed(_)) => {
                    debug!(conn_id = %conn_id, event = %event, "Skipping closed connection");
                }
            }
        }
        for conn_id in stalled {
            warn!(conn_id = %conn_id, event = %event, "Outbound queue full, dropping connection");
            self.on_disconnect(&conn_id).await;
        }
        #[cfg(feature = "metrics")]
        crate::metrics::record_frames_delivered(event, delivered);
        delivered
    }

    /// Number of live connections.
    pub async fn connection_count(&self) -> usize {
        self.membership.read().await.connections.len()
    }
}

impl Default for Gateway {
    fn default() -> Self {
        Self::new()
    }
}

fn room_id<'a>(event: &str, data: &'a Value) -> Result<&'a str, GatewayError> {
    match data.as_str() {
        Some(room) if !room.is_empty() => Ok(room),
        _ => Err(GatewayError::InvalidPayload {
            event: event.to_string(),
            reason: "expected a non-empty user id string".into(),
        }),
    }
}

fn remove_member(rooms: &mut HashMap<String, HashSet<ConnectionId>>, room: &str, conn_id: &str) {
    if let Some(members) = rooms.get_mut(room) {
        members.remove(conn_id);
        if members.is_empty() {
            rooms.remove(room);
        }
    }
}
