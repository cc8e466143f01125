//! Device routes: registration, listing, removal and ledger reads.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument};

use crate::storage::{DatabaseError, Device, DeviceType, LocationFix, NewDevice};

use super::AppState;
use super::error::{ApiError, success};
use super::extract::AuthUser;

const DEFAULT_DEVICE_NAME: &str = "Unknown Device";
const DEVICE_NAME_MAX_CHARS: usize = 100;
const DEFAULT_HISTORY_LIMIT: u32 = 100;
const MAX_HISTORY_LIMIT: u32 = 1000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDeviceRequest {
    pub device_id: String,
    pub device_name: Option<String>,
    pub device_type: Option<String>,
    pub os: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
}

/// `{ coordinates: [lng, lat], address, timestamp }`
#[derive(Debug, Serialize)]
pub struct LocationView {
    pub coordinates: [f64; 2],
    pub address: String,
    pub timestamp: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceView {
    pub device_id: String,
    pub device_name: String,
    pub device_type: DeviceType,
    pub os: Option<String>,
    pub owner: String,
    pub is_active: bool,
    pub is_online: bool,
    pub last_seen: i64,
    pub current_location: Option<LocationView>,
    pub created_at: i64,
}

impl From<&Device> for DeviceView {
    fn from(device: &Device) -> Self {
        let current_location = device.current_point().map(|point| LocationView {
            coordinates: point.lng_lat(),
            address: device.current_address.clone(),
            timestamp: device.current_fix_at.unwrap_or(device.last_seen),
        });
        Self {
            device_id: device.device_id.clone(),
            device_name: device.name.clone(),
            device_type: device.device_type,
            os: device.os.clone(),
            owner: device.owner_id.clone(),
            is_active: device.is_active,
            is_online: device.is_online,
            last_seen: device.last_seen,
            current_location,
            created_at: device.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct FixView {
    id: i64,
    coordinates: [f64; 2],
    address: String,
    accuracy: Option<f64>,
    speed: Option<f64>,
    altitude: Option<f64>,
    timestamp: i64,
}

impl From<&LocationFix> for FixView {
    fn from(fix: &LocationFix) -> Self {
        Self {
            id: fix.id,
            coordinates: fix.point().lng_lat(),
            address: fix.address.clone(),
            accuracy: fix.accuracy,
            speed: fix.speed,
            altitude: fix.altitude,
            timestamp: fix.recorded_at,
        }
    }
}

/// Look up a device and make sure the caller owns it.
async fn owned_device(
    state: &AppState,
    auth: &AuthUser,
    device_id: &str,
    action: &str,
) -> Result<Device, ApiError> {
    let device = state
        .db
        .find_device_by_external_id(device_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Device not found".into()))?;
    if device.owner_id != auth.id() {
        return Err(ApiError::Forbidden(format!(
            "Not authorized to {action} this device"
        )));
    }
    Ok(device)
}

/// `POST /api/devices/register`
#[instrument(skip_all, fields(route = "register_device", user_id = %auth.id()))]
pub async fn register_device(
    State(state): State<AppState>,
    auth: AuthUser,
    payload: Result<Json<RegisterDeviceRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;

    let device_id = req.device_id.trim();
    if device_id.is_empty() {
        return Err(ApiError::BadRequest("Device ID is required".into()));
    }
    let name = req
        .device_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(DEFAULT_DEVICE_NAME);
    if name.chars().count() > DEVICE_NAME_MAX_CHARS {
        return Err(ApiError::BadRequest(format!(
            "Device name cannot be more than {DEVICE_NAME_MAX_CHARS} characters"
        )));
    }
    let device_type = match req.device_type.as_deref() {
        Some(raw) => raw.parse::<DeviceType>().map_err(ApiError::BadRequest)?,
        None => DeviceType::default(),
    };

    let row_id = uuid::Uuid::new_v4().to_string();
    let device = match state
        .db
        .create_device(&NewDevice {
            id: &row_id,
            device_id,
            name,
            device_type,
            os: req.os.as_deref(),
            owner_id: auth.id(),
        })
        .await
    {
        Ok(device) => device,
        Err(DatabaseError::Conflict(_)) => {
            return Err(ApiError::BadRequest("Device already registered".into()));
        }
        Err(e) => return Err(e.into()),
    };
    info!(
        device_id = %device.device_id,
        device_type = %device.device_type,
        "Device registered"
    );

    Ok((StatusCode::CREATED, success(DeviceView::from(&device))))
}

/// `GET /api/devices`
#[instrument(skip_all, fields(route = "list_devices", user_id = %auth.id()))]
pub async fn list_devices(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let devices: Vec<DeviceView> = state
        .db
        .list_devices_for_owner(auth.id())
        .await?
        .iter()
        .map(DeviceView::from)
        .collect();

    Ok(Json(json!({
        "success": true,
        "count": devices.len(),
        "data": devices,
    })))
}

/// `DELETE /api/devices/{deviceId}`
#[instrument(skip_all, fields(route = "delete_device", user_id = %auth.id()))]
pub async fn delete_device(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(device_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let device = owned_device(&state, &auth, &device_id, "delete").await?;
    state.db.remove_device(&device.device_id).await?;
    info!(device_id = %device.device_id, "Device removed");

    Ok(Json(json!({ "success": true, "message": "Device removed" })))
}

/// `GET /api/devices/{deviceId}/locations?limit=N`
#[instrument(skip_all, fields(route = "device_locations", user_id = %auth.id()))]
pub async fn device_locations(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(device_id): Path<String>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    let device = owned_device(&state, &auth, &device_id, "view").await?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);

    let fixes: Vec<FixView> = state
        .db
        .list_fixes_for_device(&device.id, limit)
        .await?
        .iter()
        .map(FixView::from)
        .collect();

    Ok(Json(json!({
        "success": true,
        "count": fixes.len(),
        "data": fixes,
    })))
}
