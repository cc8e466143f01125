//! Storage layer tests for the tracking database.

use super::db::TrackingDatabase;
use super::models::{DeviceType, GeoPoint};
use super::queries::UserUpdate;
use super::queries_ledger::NewFix;
use super::queries_presence::{LocationSnapshot, NewDevice};
use geotrail_core::db::{DatabaseError, unix_timestamp, unix_timestamp_millis};

async fn test_db() -> TrackingDatabase {
    TrackingDatabase::open_in_memory().await.unwrap()
}

async fn seed_device(db: &TrackingDatabase, device_id: &str, owner: &str) {
    if db.get_user(owner).await.is_err() {
        db.create_user(owner, &format!("{owner}@example.com"), "Ada", "Lovelace", "hash")
            .await
            .unwrap();
    }
    db.create_device(&NewDevice {
        id: &format!("row-{device_id}"),
        device_id,
        name: "Pixel",
        device_type: DeviceType::Mobile,
        os: Some("android"),
        owner_id: owner,
    })
    .await
    .unwrap();
}

fn fix<'a>(device_ref: &'a str, user_id: &'a str, lat: f64, lng: f64, at: i64) -> NewFix<'a> {
    NewFix {
        device_ref,
        user_id,
        point: GeoPoint { lat, lng },
        address: None,
        accuracy: None,
        speed: None,
        altitude: None,
        recorded_at: at,
    }
}

// === User tests ===

#[tokio::test]
async fn create_and_get_user() {
    let db = test_db().await;
    let user = db
        .create_user("u1", "ada@example.com", "Ada", "Lovelace", "hash123")
        .await
        .unwrap();

    assert_eq!(user.id, "u1");
    assert_eq!(user.email, "ada@example.com");
    assert_eq!(user.role, "user");
    assert!(user.is_active);
}

#[tokio::test]
async fn duplicate_email_is_conflict() {
    let db = test_db().await;
    db.create_user("u1", "ada@example.com", "Ada", "Lovelace", "h")
        .await
        .unwrap();

    let err = db
        .create_user("u2", "ada@example.com", "Other", "Person", "h")
        .await
        .unwrap_err();
    assert!(matches!(err, DatabaseError::Conflict(_)));
}

#[tokio::test]
async fn update_user_keeps_unset_fields() {
    let db = test_db().await;
    db.create_user("u1", "ada@example.com", "Ada", "Lovelace", "h")
        .await
        .unwrap();

    let user = db
        .update_user(
            "u1",
            &UserUpdate {
                first_name: Some("Augusta"),
                ..UserUpdate::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(user.first_name, "Augusta");
    assert_eq!(user.last_name, "Lovelace");

    assert!(matches!(
        db.update_user("missing", &UserUpdate::default()).await,
        Err(DatabaseError::NotFound(_))
    ));
}

// === Token tests ===

#[tokio::test]
async fn find_token_by_hash_skips_expired() {
    let db = test_db().await;
    db.create_user("u1", "ada@example.com", "Ada", "Lovelace", "h")
        .await
        .unwrap();

    db.create_token("t1", "u1", "live", unix_timestamp() + 3600)
        .await
        .unwrap();
    db.create_token("t2", "u1", "stale", unix_timestamp() - 1)
        .await
        .unwrap();

    assert!(db.get_token_by_hash("live").await.unwrap().is_some());
    assert!(db.get_token_by_hash("stale").await.unwrap().is_none());
}

#[tokio::test]
async fn revoke_token_only_once() {
    let db = test_db().await;
    db.create_user("u1", "ada@example.com", "Ada", "Lovelace", "h")
        .await
        .unwrap();
    db.create_token("t1", "u1", "hash", unix_timestamp() + 3600)
        .await
        .unwrap();

    assert!(db.revoke_token("t1").await.unwrap());
    assert!(!db.revoke_token("t1").await.unwrap());
    assert!(db.get_token_by_hash("hash").await.unwrap().is_none());
}

// === Device / presence tests ===

#[tokio::test]
async fn create_device_defaults_offline() {
    let db = test_db().await;
    seed_device(&db, "dev-1", "user-7").await;

    let device = db.get_device("dev-1").await.unwrap();
    assert_eq!(device.owner_id, "user-7");
    assert_eq!(device.device_type, DeviceType::Mobile);
    assert!(!device.is_online);
    assert!(device.current_point().is_none());
    assert_eq!(device.current_address, "");
}

#[tokio::test]
async fn device_type_is_decoded() {
    let db = test_db().await;
    seed_device(&db, "dev-1", "user-7").await;
    db.create_device(&NewDevice {
        id: "row-tab",
        device_id: "tab-1",
        name: "Tablet",
        device_type: DeviceType::Tablet,
        os: None,
        owner_id: "user-7",
    })
    .await
    .unwrap();

    let device = db.get_device("tab-1").await.unwrap();
    assert_eq!(device.device_type, DeviceType::Tablet);
    assert_eq!(device.device_type.to_string(), "tablet");
}

#[tokio::test]
async fn duplicate_device_id_is_conflict() {
    let db = test_db().await;
    seed_device(&db, "dev-1", "user-7").await;

    let err = db
        .create_device(&NewDevice {
            id: "other-row",
            device_id: "dev-1",
            name: "Tablet",
            device_type: DeviceType::Tablet,
            os: None,
            owner_id: "user-7",
        })
        .await
        .unwrap_err();
    assert!(matches!(err, DatabaseError::Conflict(_)));
}

#[tokio::test]
async fn find_unknown_device_is_none() {
    let db = test_db().await;
    assert!(
        db.find_device_by_external_id("ghost-9")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn upsert_current_location_overwrites_snapshot() {
    let db = test_db().await;
    seed_device(&db, "dev-1", "user-7").await;

    let device = db
        .upsert_current_location(
            "dev-1",
            &LocationSnapshot {
                point: GeoPoint {
                    lat: 40.7128,
                    lng: -74.006,
                },
                address: Some("NYC".into()),
                fix_at: 1000,
            },
        )
        .await
        .unwrap();
    assert!(device.is_online);
    assert_eq!(device.current_address, "NYC");
    assert_eq!(
        device.current_point(),
        Some(GeoPoint {
            lat: 40.7128,
            lng: -74.006
        })
    );

    // Missing or empty address keeps the previous one.
    for address in [None, Some(String::new())] {
        let device = db
            .upsert_current_location(
                "dev-1",
                &LocationSnapshot {
                    point: GeoPoint { lat: 1.0, lng: 2.0 },
                    address,
                    fix_at: 2000,
                },
            )
            .await
            .unwrap();
        assert_eq!(device.current_address, "NYC");
        assert_eq!(device.current_fix_at, Some(2000));
    }
}

#[tokio::test]
async fn upsert_unknown_device_is_not_found() {
    let db = test_db().await;
    let result = db
        .upsert_current_location(
            "ghost-9",
            &LocationSnapshot {
                point: GeoPoint { lat: 0.0, lng: 0.0 },
                address: None,
                fix_at: 0,
            },
        )
        .await;
    assert!(matches!(result, Err(DatabaseError::NotFound(_))));
}

#[tokio::test]
async fn mark_stale_devices_offline_returns_changed_rows() {
    let db = test_db().await;
    seed_device(&db, "dev-1", "user-7").await;
    seed_device(&db, "dev-2", "user-7").await;
    let snapshot = LocationSnapshot {
        point: GeoPoint { lat: 0.0, lng: 0.0 },
        address: None,
        fix_at: 0,
    };
    db.upsert_current_location("dev-1", &snapshot).await.unwrap();

    // A cutoff in the future makes every online device stale.
    let changed = db
        .mark_stale_devices_offline(unix_timestamp_millis() + 60_000)
        .await
        .unwrap();
    assert_eq!(changed.len(), 1);
    assert_eq!(changed[0].device_id, "dev-1");
    assert!(!changed[0].is_online);

    let again = db
        .mark_stale_devices_offline(unix_timestamp_millis() + 60_000)
        .await
        .unwrap();
    assert!(again.is_empty());
}

#[tokio::test]
async fn list_devices_for_owner_filters_by_owner() {
    let db = test_db().await;
    seed_device(&db, "dev-1", "user-7").await;
    seed_device(&db, "dev-2", "user-8").await;

    let devices = db.list_devices_for_owner("user-7").await.unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].device_id, "dev-1");
}

// === Ledger tests ===

#[tokio::test]
async fn identical_fixes_are_distinct_rows() {
    let db = test_db().await;
    seed_device(&db, "dev-1", "user-7").await;

    let a = db
        .append_fix(&fix("row-dev-1", "user-7", 1.0, 2.0, 500))
        .await
        .unwrap();
    let b = db
        .append_fix(&fix("row-dev-1", "user-7", 1.0, 2.0, 500))
        .await
        .unwrap();

    assert_ne!(a.id, b.id);
    assert_eq!(a.point(), b.point());
    assert_eq!(a.address, "");
    assert_eq!(db.count_fixes_for_device("row-dev-1").await.unwrap(), 2);
}

#[tokio::test]
async fn list_fixes_returns_newest_window_in_order() {
    let db = test_db().await;
    seed_device(&db, "dev-1", "user-7").await;

    for (i, at) in [100_i64, 200, 300, 400].into_iter().enumerate() {
        #[allow(clippy::cast_precision_loss)]
        let lat = i as f64;
        db.append_fix(&fix("row-dev-1", "user-7", lat, 0.0, at))
            .await
            .unwrap();
    }

    let fixes = db.list_fixes_for_device("row-dev-1", 2).await.unwrap();
    let times: Vec<i64> = fixes.iter().map(|f| f.recorded_at).collect();
    assert_eq!(times, vec![300, 400]);
}

#[tokio::test]
async fn purge_expired_fixes_respects_retention() {
    let db = test_db().await;
    seed_device(&db, "dev-1", "user-7").await;
    db.append_fix(&fix("row-dev-1", "user-7", 1.0, 1.0, 1))
        .await
        .unwrap();

    assert_eq!(db.purge_expired_fixes(3600).await.unwrap(), 0);
    // Zero retention expires everything created up to now.
    assert_eq!(db.purge_expired_fixes(0).await.unwrap(), 1);
    assert_eq!(db.count_fixes_for_device("row-dev-1").await.unwrap(), 0);
}

#[tokio::test]
async fn removing_device_cascades_to_ledger() {
    let db = test_db().await;
    seed_device(&db, "dev-1", "user-7").await;
    db.append_fix(&fix("row-dev-1", "user-7", 1.0, 1.0, 1))
        .await
        .unwrap();

    assert!(db.remove_device("dev-1").await.unwrap());
    assert!(!db.remove_device("dev-1").await.unwrap());
    assert_eq!(db.count_fixes_for_device("row-dev-1").await.unwrap(), 0);
}
