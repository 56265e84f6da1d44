//! Materialized projection views over the property catalog.

use pretty_assertions::assert_eq;
use serde_json::{json, Map, Value};
use strata::ast::IndexMethod;
use strata::catalog::{self, views};
use strata::driver::{MemoryDatabase, MemoryDriver};
use strata::migrate::{RunnerConfig, Version};
use strata::views::rebuild;
use strata::error::OrderingReason;
use strata::Error;

fn id(n: u32) -> String {
    format!("00000000-0000-4000-8000-{:012}", n)
}

const NORTH_HALL: u32 = 30;
const SOUTH_ANNEX: u32 = 31;
const CLOSED_DEPOT: u32 = 32;

async fn migrated(target: Option<&str>) -> (MemoryDatabase, MemoryDriver) {
    let db = MemoryDatabase::new();
    let mut session = db.connect();
    let target = target.map(|t| Version::parse(t).unwrap());
    catalog::runner(RunnerConfig::default())
        .unwrap()
        .apply(&mut session, target)
        .await
        .unwrap();
    (db, session)
}

fn seed(db: &MemoryDatabase) {
    db.insert("public.organisation_type", json!({ "id": id(1), "name": "Charity" }))
        .unwrap();
    db.insert(
        "public.organisation",
        json!({ "id": id(10), "name": "Acme Trust", "organisation_type_id": id(1) }),
    )
    .unwrap();
    for (n, name) in [(20, "Lift"), (21, "Parking"), (22, "Bike store")] {
        db.insert("public.facility", json!({ "id": id(n), "name": name })).unwrap();
    }
    db.soft_delete("public.facility", "id", json!(id(21))).unwrap();

    for (n, name) in [(NORTH_HALL, "North Hall"), (SOUTH_ANNEX, "South Annex"), (CLOSED_DEPOT, "Closed Depot")] {
        db.insert(
            "public.property",
            json!({
                "id": id(n),
                "name": name,
                "organisation_id": id(10),
                "location": { "type": "Point", "coordinates": [-1.25, 51.75] },
            }),
        )
        .unwrap();
    }
    db.update(
        "public.property",
        "id",
        json!(id(NORTH_HALL)),
        json!({ "facility_ids": [id(22), id(20), id(21)] }),
    )
    .unwrap();
    db.soft_delete("public.property", "id", json!(id(CLOSED_DEPOT))).unwrap();

    for (n, name, area) in [(40, "Studio B", 18.5), (41, "Studio A", 22.0), (42, "Old Store", 9.0)] {
        db.insert(
            "public.space",
            json!({ "id": id(n), "property_id": id(NORTH_HALL), "name": name, "floor_area": area }),
        )
        .unwrap();
    }
    db.soft_delete("public.space", "id", json!(id(42))).unwrap();
}

fn listing(db: &MemoryDatabase, property: u32) -> Option<Map<String, Value>> {
    db.view_rows(views::PROPERTY_LISTING)
        .unwrap()
        .into_iter()
        .find(|row| row["id"] == json!(id(property)))
}

fn names(value: &Value) -> Vec<&str> {
    value
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["name"].as_str().unwrap())
        .collect()
}

async fn seeded() -> (MemoryDatabase, MemoryDriver) {
    let (db, mut session) = migrated(None).await;
    seed(&db);
    rebuild(&mut session, &views::property_listing_v2()).await.unwrap();
    (db, session)
}

#[tokio::test]
async fn listing_shape() {
    let (db, _session) = seeded().await;
    let north = listing(&db, NORTH_HALL).unwrap();

    let mut columns: Vec<&str> = north.keys().map(String::as_str).collect();
    columns.sort_unstable();
    assert_eq!(
        columns,
        ["facilities", "id", "location", "name", "organisation", "spaces", "tenancies"]
    );
    assert_eq!(north["name"], json!("North Hall"));
    assert_eq!(names(&north["facilities"]), ["Bike store", "Lift"]);
    assert_eq!(north["organisation"], json!({ "id": id(10), "name": "Acme Trust" }));
    assert_eq!(
        north["spaces"][0],
        json!({ "id": id(41), "name": "Studio A", "floor_area": 22.0, "accessible": false })
    );
}

#[tokio::test]
async fn soft_deleted_rows_are_excluded() {
    let (db, _session) = seeded().await;
    assert!(listing(&db, CLOSED_DEPOT).is_none());

    let north = listing(&db, NORTH_HALL).unwrap();
    assert_eq!(names(&north["spaces"]), ["Studio A", "Studio B"]);
    assert!(!names(&north["facilities"]).contains(&"Parking"));
}

#[tokio::test]
async fn empty_collections_are_empty_arrays() {
    let (db, _session) = seeded().await;
    let south = listing(&db, SOUTH_ANNEX).unwrap();
    assert_eq!(south["facilities"], json!([]));
    assert_eq!(south["spaces"], json!([]));
    assert_eq!(south["tenancies"], json!([]));
}

#[tokio::test]
async fn deleted_parent_reads_as_null() {
    let (db, mut session) = seeded().await;
    db.soft_delete("public.organisation", "id", json!(id(10))).unwrap();
    rebuild(&mut session, &views::property_listing_v2()).await.unwrap();

    let north = listing(&db, NORTH_HALL).unwrap();
    assert_eq!(north["organisation"], Value::Null);
}

#[tokio::test]
async fn changes_appear_only_after_rebuild() {
    let (db, mut session) = seeded().await;
    db.insert(
        "public.tenancy",
        json!({
            "id": id(50),
            "property_id": id(SOUTH_ANNEX),
            "organisation_id": id(10),
            "starts_on": "2024-04-01",
        }),
    )
    .unwrap();
    db.update("public.space", "id", json!(id(40)), json!({ "accessible": true }))
        .unwrap();

    assert_eq!(listing(&db, SOUTH_ANNEX).unwrap()["tenancies"], json!([]));

    rebuild(&mut session, &views::property_listing_v2()).await.unwrap();
    let south = listing(&db, SOUTH_ANNEX).unwrap();
    assert_eq!(south["tenancies"][0]["starts_on"], json!("2024-04-01"));
    assert_eq!(south["tenancies"][0]["organisation_id"], json!(id(10)));
    let north = listing(&db, NORTH_HALL).unwrap();
    assert_eq!(north["spaces"][1]["accessible"], json!(true));
}

#[tokio::test]
async fn failed_rebuild_keeps_the_old_view() {
    // Stop before `space.accessible` exists; v2 reads it.
    let (db, mut session) = migrated(Some("20230720150000")).await;
    seed(&db);
    rebuild(&mut session, &views::property_listing_v1()).await.unwrap();
    let before = db.view_rows(views::PROPERTY_LISTING).unwrap();

    let err = rebuild(&mut session, &views::property_listing_v2()).await.unwrap_err();
    match err {
        Error::RebuildFailure { view, step, .. } => {
            assert_eq!(view, views::PROPERTY_LISTING);
            assert_eq!(step, 2);
        }
        other => panic!("expected RebuildFailure, got {other:?}"),
    }

    assert_eq!(db.view_rows(views::PROPERTY_LISTING).unwrap(), before);
    assert!(db.index("public_api.property_listing_id").is_some());
}

#[tokio::test]
async fn indexes_follow_the_view() {
    let (db, mut session) = seeded().await;
    let spatial = db.index("public_api.property_listing_location").unwrap();
    assert_eq!(spatial.method, IndexMethod::Gist);
    assert_eq!(spatial.columns, ["location"]);
    assert!(db.index("public_api.property_listing_id").unwrap().unique);

    rebuild(&mut session, &views::organisation_listing()).await.unwrap();
    assert!(db.index("public_api.organisation_listing_id").is_some());
    assert!(db.index("public_api.property_listing_location").is_some());
}

#[tokio::test]
async fn organisation_listing_aliases_parent_fields() {
    let (db, mut session) = seeded().await;
    rebuild(&mut session, &views::organisation_listing()).await.unwrap();

    let rows = db.view_rows(views::ORGANISATION_LISTING).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0]["organisation_type"],
        json!({ "id": id(1), "label": "Charity" })
    );
}

#[tokio::test]
async fn view_columns_block_column_drops() {
    let (db, _session) = seeded().await;
    let err = db
        .execute(&strata::ast::SchemaOp::drop_column("public.space", "accessible"))
        .unwrap_err();
    assert!(err.to_string().contains("depends on it"));
}

#[tokio::test]
async fn runner_rebuild_waits_for_pending_migrations() {
    let (db, mut session) = migrated(Some("20230720150000")).await;
    seed(&db);
    let runner = catalog::runner(RunnerConfig::default()).unwrap();
    let before = db.view_rows(views::PROPERTY_LISTING).unwrap();

    let err = runner
        .rebuild_view(&mut session, &views::property_listing_v2())
        .await
        .unwrap_err();
    match err {
        Error::OrderingViolation { version, reason: OrderingReason::NotApplied } => {
            assert_eq!(version, Version::parse("20230905110000").unwrap());
        }
        other => panic!("expected NotApplied, got {other:?}"),
    }
    assert_eq!(db.view_rows(views::PROPERTY_LISTING).unwrap(), before);

    // The lock was released: another session can migrate and rebuild.
    let mut other = db.connect();
    runner.apply(&mut other, None).await.unwrap();
    runner
        .rebuild_view(&mut other, &views::property_listing_v2())
        .await
        .unwrap();
    assert_eq!(listing(&db, NORTH_HALL).unwrap()["spaces"].as_array().unwrap().len(), 2);
}
