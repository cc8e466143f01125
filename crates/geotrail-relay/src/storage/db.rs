//! `SQLite` database handle for the Geotrail relay.

geotrail_core::define_database!(TrackingDatabase, "Tracking database migrations complete");
