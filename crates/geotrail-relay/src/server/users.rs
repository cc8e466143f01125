//! Account routes: registration, login, token rotation, profile.

use std::sync::LazyLock;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::auth::password;
use crate::auth::{JwtManager, TokenPair};
use crate::storage::{DatabaseError, User, UserUpdate};

use super::AppState;
use super::devices::DeviceView;
use super::error::{ApiError, success};
use super::extract::AuthUser;

const NAME_MAX_CHARS: usize = 50;
const PASSWORD_MIN_CHARS: usize = 6;

static EMAIL_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok());

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdateRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Public view of an account.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: String,
    pub is_active: bool,
    pub created_at: i64,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
            role: user.role.clone(),
            is_active: user.is_active,
            created_at: user.created_at,
        }
    }
}

/// Account plus a fresh token pair.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionView {
    id: String,
    first_name: String,
    last_name: String,
    email: String,
    access_token: String,
    refresh_token: String,
    expires_in: i64,
}

impl SessionView {
    fn new(user: &User, tokens: TokenPair) -> Self {
        Self {
            id: user.id.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_in: tokens.expires_in,
        }
    }
}

fn validate_name(field: &str, value: &str) -> Result<String, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::BadRequest(format!("{field} is required")));
    }
    if value.chars().count() > NAME_MAX_CHARS {
        return Err(ApiError::BadRequest(format!(
            "{field} cannot be more than {NAME_MAX_CHARS} characters"
        )));
    }
    Ok(value.to_string())
}

/// Trimmed and lower-cased.
fn validate_email(value: &str) -> Result<String, ApiError> {
    let email = value.trim().to_lowercase();
    let valid = EMAIL_RE.as_ref().is_some_and(|re| re.is_match(&email));
    if !valid {
        return Err(ApiError::BadRequest("Please add a valid email".into()));
    }
    Ok(email)
}

fn validate_password(value: &str) -> Result<(), ApiError> {
    if value.chars().count() < PASSWORD_MIN_CHARS {
        return Err(ApiError::BadRequest(format!(
            "Password must be at least {PASSWORD_MIN_CHARS} characters"
        )));
    }
    Ok(())
}

fn hash(password: &str) -> Result<String, ApiError> {
    password::hash_password(password)
        .map_err(|e| ApiError::Internal(format!("Password hashing failed: {e}")))
}

/// Mint a token pair and store the refresh token's hash.
async fn start_session(state: &AppState, user: &User) -> Result<TokenPair, ApiError> {
    let tokens = state
        .jwt
        .issue_pair(&user.id, &user.email)
        .map_err(|e| ApiError::Internal(format!("Token creation failed: {e}")))?;

    let token_id = uuid::Uuid::new_v4().to_string();
    state
        .db
        .create_token(
            &token_id,
            &user.id,
            &JwtManager::hash_token(&tokens.refresh_token),
            tokens.refresh_expires_at,
        )
        .await?;
    Ok(tokens)
}

/// `POST /api/users/register`
#[instrument(skip_all, fields(route = "register"))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let first_name = validate_name("First name", &req.first_name)?;
    let last_name = validate_name("Last name", &req.last_name)?;
    let email = validate_email(&req.email)?;
    validate_password(&req.password)?;

    match state.db.get_user_by_email(&email).await {
        Ok(_) => return Err(ApiError::BadRequest("User already exists".into())),
        Err(DatabaseError::NotFound(_)) => {}
        Err(e) => return Err(e.into()),
    }

    let user_id = uuid::Uuid::new_v4().to_string();
    let user = match state
        .db
        .create_user(&user_id, &email, &first_name, &last_name, &hash(&req.password)?)
        .await
    {
        Ok(user) => user,
        Err(DatabaseError::Conflict(_)) => {
            return Err(ApiError::BadRequest("User already exists".into()));
        }
        Err(e) => return Err(e.into()),
    };

    let tokens = start_session(&state, &user).await?;
    info!(user_id = %user.id, "User registered");

    Ok((StatusCode::CREATED, success(SessionView::new(&user, tokens))))
}

/// `POST /api/users/login`
#[instrument(skip_all, fields(route = "login"))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let invalid = || ApiError::Unauthorized("Invalid email or password".into());

    let email = req.email.trim().to_lowercase();
    let user = match state.db.get_user_by_email(&email).await {
        Ok(user) => user,
        Err(DatabaseError::NotFound(_)) => return Err(invalid()),
        Err(e) => return Err(e.into()),
    };

    let valid = password::verify_password(&req.password, &user.password_hash)
        .map_err(|e| ApiError::Internal(format!("Password verification failed: {e}")))?;
    if !valid {
        warn!(user_id = %user.id, "Failed login attempt");
        return Err(invalid());
    }
    if !user.is_active {
        return Err(ApiError::Unauthorized("Account is disabled".into()));
    }

    let tokens = start_session(&state, &user).await?;
    info!(user_id = %user.id, "User logged in");

    Ok(success(SessionView::new(&user, tokens)))
}

/// `POST /api/users/refresh`. Refresh tokens are single-use.
#[instrument(skip_all, fields(route = "refresh"))]
pub async fn refresh(
    State(state): State<AppState>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let invalid = || ApiError::Unauthorized("Invalid refresh token".into());

    let claims = state
        .jwt
        .validate(&req.refresh_token)
        .map_err(|_| invalid())?;
    if !claims.is_refresh() {
        return Err(ApiError::BadRequest("Not a refresh token".into()));
    }

    let stored = state
        .db
        .get_token_by_hash(&JwtManager::hash_token(&req.refresh_token))
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Refresh token revoked or expired".into()))?;

    // Losing a concurrent rotation race counts as reuse.
    if !state.db.revoke_token(&stored.id).await? {
        return Err(ApiError::Unauthorized("Refresh token revoked or expired".into()));
    }

    let user = state.db.get_user(&stored.user_id).await.map_err(|_| invalid())?;
    let tokens = start_session(&state, &user).await?;

    Ok(success(json!({
        "accessToken": tokens.access_token,
        "refreshToken": tokens.refresh_token,
        "expiresIn": tokens.expires_in,
    })))
}

/// `POST /api/users/logout`
#[instrument(skip_all, fields(route = "logout"))]
pub async fn logout(
    State(state): State<AppState>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;

    let stored = state
        .db
        .get_token_by_hash(&JwtManager::hash_token(&req.refresh_token))
        .await?;
    let revoked = match stored {
        Some(token) => state.db.revoke_token(&token.id).await?,
        None => false,
    };

    Ok(success(json!({ "revoked": revoked })))
}

/// `GET /api/users/profile`
#[instrument(skip_all, fields(route = "get_profile", user_id = %auth.id()))]
pub async fn get_profile(
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

    let mut profile = serde_json::to_value(UserView::from(&auth.user))
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    profile["devices"] = json!(devices);

    Ok(success(profile))
}

/// `PUT /api/users/profile`
#[instrument(skip_all, fields(route = "update_profile", user_id = %auth.id()))]
pub async fn update_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    payload: Result<Json<ProfileUpdateRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;

    let first_name = req
        .first_name
        .as_deref()
        .map(|v| validate_name("First name", v))
        .transpose()?;
    let last_name = req
        .last_name
        .as_deref()
        .map(|v| validate_name("Last name", v))
        .transpose()?;
    let email = req.email.as_deref().map(validate_email).transpose()?;
    let password_hash = match req.password.as_deref() {
        Some(p) => {
            validate_password(p)?;
            Some(hash(p)?)
        }
        None => None,
    };

    let update = UserUpdate {
        first_name: first_name.as_deref(),
        last_name: last_name.as_deref(),
        email: email.as_deref(),
        password_hash: password_hash.as_deref(),
    };
    if update.first_name.is_none()
        && update.last_name.is_none()
        && update.email.is_none()
        && update.password_hash.is_none()
    {
        return Err(ApiError::BadRequest("Nothing to update".into()));
    }

    let user = match state.db.update_user(auth.id(), &update).await {
        Ok(user) => user,
        Err(DatabaseError::Conflict(_)) => {
            return Err(ApiError::BadRequest("Email already in use".into()));
        }
        Err(e) => return Err(e.into()),
    };
    info!(user_id = %user.id, "Profile updated");

    Ok(success(UserView::from(&user)))
}
