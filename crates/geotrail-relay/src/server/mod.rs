//! HTTP and WebSocket surface of the relay.

pub mod devices;
pub mod error;
pub mod extract;
mod health;
pub mod users;
pub mod ws;

#[cfg(test)]
pub(crate) mod test_helpers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post};
use tower_http::cors::CorsLayer;

use crate::auth::JwtManager;
use crate::gateway::Gateway;
use crate::storage::TrackingDatabase;

pub use error::ApiError;
pub use extract::AuthUser;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub db: TrackingDatabase,
    pub jwt: Arc<JwtManager>,
    pub gateway: Arc<Gateway>,
    /// Outbound queue capacity per live connection.
    pub outbound_queue: usize,
    pub require_ws_token: bool,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/start", get(health::start))
        .route("/health", get(health::health))
        .route("/ws", get(ws::ws_handler))
        .route("/api/users/register", post(users::register))
        .route("/api/users/login", post(users::login))
        .route("/api/users/refresh", post(users::refresh))
        .route("/api/users/logout", post(users::logout))
        .route(
            "/api/users/profile",
            get(users::get_profile).put(users::update_profile),
        )
        .route("/api/devices", get(devices::list_devices))
        .route("/api/devices/register", post(devices::register_device))
        .route("/api/devices/{device_id}", delete(devices::delete_device))
        .route(
            "/api/devices/{device_id}/locations",
            get(devices::device_locations),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}
