//! Geotrail Relay Server
//!
//! Accepts live location reports over WebSocket, stores them, and fans them
//! out to watchers.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use geotrail_core::config::{self, Config};
use geotrail_relay::auth::JwtManager;
use geotrail_relay::gateway::Gateway;
use geotrail_relay::maintenance::{PresenceMonitor, RetentionSweeper};
use geotrail_relay::relay::LocationRelay;
use geotrail_relay::server::{AppState, build_router};
use geotrail_relay::storage::TrackingDatabase;

#[derive(Parser, Debug)]
#[command(name = "geotrail-relay")]
#[command(
    version,
    about = "Geotrail relay server - live location fan-out and history"
)]
struct Args {
    /// Address to listen on (overrides settings.json / GEOTRAIL_ADDR).
    #[arg(long)]
    addr: Option<SocketAddr>,

    /// Path to SQLite database file.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// JWT secret key.
    #[arg(long, env = "GEOTRAIL_JWT_SECRET")]
    jwt_secret: Option<String>,

    /// Access token TTL in seconds.
    #[arg(long)]
    access_ttl: Option<i64>,

    /// Refresh token TTL in seconds.
    #[arg(long)]
    refresh_ttl: Option<i64>,

    /// Reject live connections without a valid access token.
    #[arg(long)]
    require_ws_token: bool,

    /// How long historical fixes are kept, in seconds.
    #[arg(long)]
    retention_secs: Option<i64>,

    /// Seconds of silence before a device is marked offline.
    #[arg(long)]
    offline_after: Option<i64>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long)]
    log_json: bool,

    /// OTLP collector endpoint, e.g. http://localhost:4317.
    #[cfg(feature = "metrics")]
    #[arg(long, env = "GEOTRAIL_METRICS_ENDPOINT")]
    metrics_endpoint: Option<String>,
}

impl Args {
    /// Fold CLI flags over the file/env configuration.
    fn apply(&self, config: &mut Config) {
        if let Some(addr) = self.addr {
            config.server.addr = addr.to_string();
        }
        if let Some(path) = &self.db_path {
            config.server.database_path = Some(path.clone());
        }
        if let Some(secret) = &self.jwt_secret {
            config.auth.jwt_secret.clone_from(secret);
        }
        if let Some(ttl) = self.access_ttl {
            config.auth.access_ttl_secs = ttl;
        }
        if let Some(ttl) = self.refresh_ttl {
            config.auth.refresh_ttl_secs = ttl;
        }
        if self.require_ws_token {
            config.auth.require_ws_token = true;
        }
        if let Some(secs) = self.retention_secs {
            config.tracking.retention_secs = secs;
        }
        if let Some(secs) = self.offline_after {
            config.tracking.offline_after_secs = secs;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = config::load_config()?;
    args.apply(&mut config);

    geotrail_core::tracing_init::init_tracing(
        &format!("geotrail_relay={}", config.server.log_level),
        args.log_json,
    );

    #[cfg(feature = "metrics")]
    let metrics_guard = match &args.metrics_endpoint {
        Some(endpoint) => Some(geotrail_core::metrics::init_metrics(
            endpoint,
            "geotrail-relay",
        )?),
        None => None,
    };

    let addr: SocketAddr = config.server.addr.parse()?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %addr,
        "Starting geotrail-relay"
    );

    let db_path = config
        .server
        .database_path
        .clone()
        .or_else(config::database_path)
        .ok_or_else(|| anyhow::anyhow!("Cannot determine database path"))?;
    info!(path = %db_path.display(), "Opening tracking database");
    let db = TrackingDatabase::open(&db_path).await?;

    let jwt = Arc::new(JwtManager::new(
        config.auth.jwt_secret.as_bytes(),
        config.auth.access_ttl_secs,
        config.auth.refresh_ttl_secs,
    ));
    let gateway = Arc::new(Gateway::new());

    // The gateway only holds a weak handle; `_relay` keeps it alive.
    let relay = Arc::new(LocationRelay::new(db.clone(), Arc::clone(&gateway)));
    relay.attach().await;
    let _relay = relay;

    let tracking = &config.tracking;
    RetentionSweeper::new(db.clone(), tracking.retention_secs)
        .spawn(Duration::from_secs(tracking.sweep_interval_secs.max(1)));
    PresenceMonitor::new(db.clone(), Arc::clone(&gateway), tracking.offline_after_secs)
        .spawn(Duration::from_secs(tracking.presence_check_interval_secs.max(1)));

    let state = AppState {
        db,
        jwt,
        gateway,
        outbound_queue: config.server.outbound_queue,
        require_ws_token: config.auth.require_ws_token,
    };

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "Relay server listening");

    tokio::select! {
        result = axum::serve(listener, build_router(state)) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    #[cfg(feature = "metrics")]
    if let Some(guard) = metrics_guard {
        guard.shutdown()?;
    }

    info!("Relay stopped");
    Ok(())
}
