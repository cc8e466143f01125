//! `Geotrail` Core Library
//!
//! Shared functionality for `Geotrail` components:
//! - Configuration resolution and hierarchy
//! - `SQLite` pool helpers and timestamps
//! - Tracing initialisation
//! - Common error types

pub mod config;
pub mod db;
pub mod error;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod tracing_init;

pub use config::Config;
pub use error::{Error, Result};
