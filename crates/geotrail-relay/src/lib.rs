//! Geotrail Relay Server Library
//!
//! Core functionality for the Geotrail relay:
//! - SQLite storage for users, devices, refresh tokens, and the fix ledger
//! - JWT authentication and password hashing
//! - Live gateway with rooms and per-connection outbound queues
//! - Location relay: validate, persist, fan out
//! - Background retention sweeps and presence timeouts
//! - HTTP routes for accounts and devices

pub mod auth;
pub mod gateway;
pub mod maintenance;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod relay;
pub mod server;
pub mod storage;
