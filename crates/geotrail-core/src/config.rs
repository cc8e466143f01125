//! Configuration resolution for Geotrail.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/geotrail/settings.json)
//! 3. Environment variables
//! 4. CLI arguments (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Retention window for historical fixes: 48 hours.
pub const DEFAULT_RETENTION_SECS: i64 = 172_800;

/// Complete Geotrail configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
}

/// Listener and storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
    pub database_path: Option<PathBuf>,
    pub log_level: String,
    /// Capacity of each live connection's outbound queue.
    pub outbound_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8000".to_string(),
            database_path: None,
            log_level: "info".to_string(),
            outbound_queue: 64,
        }
    }
}

/// Token issuance settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
    /// Reject WebSocket upgrades that carry no valid access token.
    pub require_ws_token: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "dev-secret-change-me".to_string(),
            access_ttl_secs: 15 * 60,
            refresh_ttl_secs: 7 * 24 * 60 * 60, // 7 days
            require_ws_token: false,
        }
    }
}

/// Ledger retention and presence bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub retention_secs: i64,
    pub sweep_interval_secs: u64,
    /// A device silent for this long is flipped offline.
    pub offline_after_secs: i64,
    pub presence_check_interval_secs: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            retention_secs: DEFAULT_RETENTION_SECS,
            sweep_interval_secs: 3600,
            offline_after_secs: 300,
            presence_check_interval_secs: 60,
        }
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config() -> Result<Config> {
    let mut config = match global_config_path() {
        Some(path) if path.exists() => load_config_file(&path)?,
        _ => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join("settings.json"))
}

/// Default location of the tracking database.
pub fn database_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join("geotrail.db"))
}

fn config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .ok()
            .map(|h| PathBuf::from(h).join(".geotrail"))
    }
    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Application Support/geotrail"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
            .map(|p| p.join("geotrail"))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        None
    }
}

/// Read a settings file. Missing sections fall back to defaults.
pub fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(val) = var("GEOTRAIL_ADDR") {
        config.server.addr = val;
    }
    if let Some(val) = var("GEOTRAIL_DB_PATH") {
        config.server.database_path = Some(PathBuf::from(val));
    }
    if let Some(val) = var("GEOTRAIL_LOG_LEVEL") {
        config.server.log_level = val;
    }
    if let Some(val) = var("GEOTRAIL_JWT_SECRET") {
        config.auth.jwt_secret = val;
    }
    if let Some(n) = var("GEOTRAIL_RETENTION_SECS").and_then(|v| v.parse().ok()) {
        config.tracking.retention_secs = n;
    }
    if let Some(n) = var("GEOTRAIL_OFFLINE_AFTER_SECS").and_then(|v| v.parse().ok()) {
        config.tracking.offline_after_secs = n;
    }
    if let Some(flag) = var("GEOTRAIL_REQUIRE_WS_TOKEN").and_then(|v| v.parse().ok()) {
        config.auth.require_ws_token = flag;
    }
}
