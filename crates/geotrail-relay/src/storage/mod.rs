//! `SQLite` storage for the Geotrail relay.
//!
//! Accounts and refresh tokens, the device presence records, and the
//! append-only location ledger.

mod db;
mod models;
mod queries;
mod queries_ledger;
mod queries_presence;

#[cfg(test)]
mod tests;

pub use db::TrackingDatabase;
pub use geotrail_core::db::DatabaseError;
pub use models::*;
pub use queries::UserUpdate;
pub use queries_ledger::NewFix;
pub use queries_presence::{LocationSnapshot, NewDevice};
