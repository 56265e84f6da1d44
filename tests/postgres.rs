//! Runs against a live server when `DATABASE_URL` is set; skipped otherwise.
//!
//! Everything lives in a throwaway schema that is dropped at the end.

use std::time::Duration;

use serde_json::{json, Value};
use sqlx::{Connection, PgConnection};
use strata::ast::{
    Children, ColumnDef, DataType, DefaultValue, Expand, MaterializedView, Parent, ProjectionQuery,
    QualifiedName, Root, SchemaOp, TableDef, Transformation,
};
use strata::driver::{Driver, PgDriver};
use strata::enum_reorder::EnumReorder;
use strata::migrate::{MigrationUnit, Runner, RunnerConfig, Version};
use strata::views::rebuild;
use strata::Error;

fn database_url() -> Option<String> {
    match std::env::var("DATABASE_URL") {
        Ok(url) => Some(url),
        Err(_) => {
            eprintln!("DATABASE_URL not set, skipping");
            None
        }
    }
}

fn units(schema: &str) -> Vec<MigrationUnit> {
    let mood = format!("{}.mood", schema);
    let reading = format!("{}.reading", schema);

    let create = MigrationUnit::new(
        "20240301000000_create_readings",
        Transformation::new()
            .op(SchemaOp::create_enum(mood.as_str(), ["LOW", "MID", "HIGH"]))
            .op(SchemaOp::create_table(
                TableDef::new(reading.as_str())
                    .column(ColumnDef::id())
                    .column(
                        ColumnDef::new("mood", DataType::Enum(mood.as_str().into()))
                            .not_null()
                            .default(DefaultValue::EnumLabel("MID".into())),
                    ),
            )),
        Transformation::new()
            .op(SchemaOp::drop_table(reading.as_str()))
            .op(SchemaOp::drop_enum(mood.as_str())),
    )
    .unwrap();

    let reorder = EnumReorder::new(mood.as_str(), ["LOW", "MID", "HIGH"], ["HIGH", "MID", "LOW"])
        .column_with_default(reading.as_str(), "mood", "MID");
    let flip = MigrationUnit::new(
        "20240302000000_flip_mood",
        reorder.build().unwrap(),
        reorder.inverse().build().unwrap(),
    )
    .unwrap();

    vec![create, flip]
}

#[tokio::test]
async fn reorder_round_trip_on_postgres() {
    let Some(url) = database_url() else { return };
    let schema = format!("strata_it_{}", uuid::Uuid::new_v4().simple());
    let config = RunnerConfig {
        ledger_table: QualifiedName::in_schema(schema.as_str(), "_strata_migrations"),
        ..RunnerConfig::default()
    };
    let runner = Runner::with_config(units(&schema), config).unwrap();

    let mut driver = PgDriver::connect(&url).await.unwrap();
    let mut check = PgConnection::connect(&url).await.unwrap();

    runner
        .apply(&mut driver, Some(Version::parse("20240301000000").unwrap()))
        .await
        .unwrap();
    driver
        .execute_raw(&format!(
            "INSERT INTO \"{schema}\".\"reading\" (mood) VALUES ('LOW'), ('HIGH'), (DEFAULT)"
        ))
        .await
        .unwrap();

    let report = runner.apply(&mut driver, None).await.unwrap();
    assert_eq!(report.applied.len(), 1);

    let labels = driver
        .enum_labels(&QualifiedName::in_schema(schema.as_str(), "mood"))
        .await
        .unwrap();
    assert_eq!(labels, Some(vec!["HIGH".to_string(), "MID".to_string(), "LOW".to_string()]));

    let sorted: Vec<String> = sqlx::query_scalar(&format!(
        "SELECT r.mood::text FROM \"{schema}\".\"reading\" AS r ORDER BY r.mood"
    ))
    .fetch_all(&mut check)
    .await
    .unwrap();
    assert_eq!(sorted, ["HIGH", "MID", "LOW"]);

    let rolled = runner.rollback(&mut driver, 1).await.unwrap();
    assert_eq!(rolled.rolled_back.len(), 1);
    let sorted: Vec<String> = sqlx::query_scalar(&format!(
        "SELECT r.mood::text FROM \"{schema}\".\"reading\" AS r ORDER BY r.mood"
    ))
    .fetch_all(&mut check)
    .await
    .unwrap();
    assert_eq!(sorted, ["LOW", "MID", "HIGH"]);

    runner.rollback(&mut driver, 1).await.unwrap();
    driver
        .execute_raw(&format!("DROP SCHEMA \"{schema}\" CASCADE"))
        .await
        .unwrap();
    driver.close().await.unwrap();
    check.close().await.unwrap();
}

#[tokio::test]
async fn lock_is_exclusive_across_sessions() {
    let Some(url) = database_url() else { return };
    let key = 0x7374_7261_7499;
    let mut first = PgDriver::connect(&url).await.unwrap();
    let mut second = PgDriver::connect(&url).await.unwrap();

    first.acquire_lock(key).await.unwrap();
    assert!(second.release_lock(key).await.is_err());
    let blocked = tokio::time::timeout(Duration::from_millis(300), second.acquire_lock(key)).await;
    assert!(blocked.is_err(), "second session acquired a held lock");

    // The abandoned request is still queued server side; drop that session.
    drop(second);
    first.release_lock(key).await.unwrap();

    let mut third = PgDriver::connect(&url).await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), third.acquire_lock(key))
        .await
        .expect("lock never became free")
        .unwrap();
    third.release_lock(key).await.unwrap();
    first.close().await.unwrap();
    third.close().await.unwrap();
}

const ACME: &str = "00000000-0000-4000-8000-000000000001";
const DEFUNCT: &str = "00000000-0000-4000-8000-000000000002";
const GYM: &str = "00000000-0000-4000-8000-000000000011";
const POOL: &str = "00000000-0000-4000-8000-000000000012";
const SAUNA: &str = "00000000-0000-4000-8000-000000000013";

fn listing_tables(schema: &str) -> Vec<SchemaOp> {
    let table = |name: &str| format!("{}.{}", schema, name);
    vec![
        SchemaOp::create_schema(schema),
        SchemaOp::create_table(
            TableDef::new(table("organisation"))
                .column(ColumnDef::id())
                .column(ColumnDef::new("name", DataType::Text).not_null())
                .column(ColumnDef::deleted_at()),
        ),
        SchemaOp::create_table(
            TableDef::new(table("facility"))
                .column(ColumnDef::id())
                .column(ColumnDef::new("name", DataType::Text).not_null())
                .column(ColumnDef::deleted_at()),
        ),
        SchemaOp::create_table(
            TableDef::new(table("property"))
                .column(ColumnDef::id())
                .column(ColumnDef::new("name", DataType::Text).not_null())
                .column(ColumnDef::new("organisation_id", DataType::Uuid).references(table("organisation"), "id"))
                .column(
                    ColumnDef::new("facility_ids", DataType::Jsonb)
                        .not_null()
                        .default(DefaultValue::EmptyJsonArray),
                )
                .column(ColumnDef::deleted_at()),
        ),
        SchemaOp::create_table(
            TableDef::new(table("space"))
                .column(ColumnDef::id())
                .column(
                    ColumnDef::new("property_id", DataType::Uuid)
                        .not_null()
                        .references(table("property"), "id"),
                )
                .column(ColumnDef::new("name", DataType::Text).not_null())
                .column(ColumnDef::deleted_at()),
        ),
    ]
}

fn listing_view(schema: &str, space_fields: &[&str]) -> MaterializedView {
    let table = |name: &str| format!("{}.{}", schema, name);
    let query = ProjectionQuery::new(
        Root::new(table("property"), "id")
            .fields(["id", "name"])
            .soft_delete("deleted_at"),
    )
    .expand(
        Expand::new("facilities", "facility_ids", table("facility"), "id")
            .fields(["name"])
            .soft_delete("deleted_at"),
    )
    .children(
        Children::new("spaces", table("space"), "property_id")
            .fields(space_fields.iter().copied())
            .soft_delete("deleted_at")
            .order_by("name"),
    )
    .parent(
        Parent::new("organisation", "organisation_id", table("organisation"), "id")
            .fields(["id", "name"])
            .soft_delete("deleted_at"),
    );
    MaterializedView::new(table("property_listing"), query).unique_index("property_listing_id", ["id"])
}

async fn listing_rows(conn: &mut PgConnection, schema: &str) -> Vec<Value> {
    let rows: Vec<String> = sqlx::query_scalar(&format!(
        "SELECT row_to_json(v)::text FROM \"{schema}\".\"property_listing\" AS v ORDER BY v.name"
    ))
    .fetch_all(conn)
    .await
    .unwrap();
    rows.iter().map(|r| serde_json::from_str(r).unwrap()).collect()
}

#[tokio::test]
async fn projection_view_on_postgres() {
    let Some(url) = database_url() else { return };
    let schema = format!("strata_it_{}", uuid::Uuid::new_v4().simple());
    let mut driver = PgDriver::connect(&url).await.unwrap();
    let mut check = PgConnection::connect(&url).await.unwrap();

    for op in listing_tables(&schema) {
        driver.execute(&op).await.unwrap();
    }
    driver
        .execute_raw(&format!(
            r#"
INSERT INTO "{schema}"."organisation" (id, name, deleted_at) VALUES
    ('{ACME}', 'Acme', NULL), ('{DEFUNCT}', 'Defunct', now());
INSERT INTO "{schema}"."facility" (id, name, deleted_at) VALUES
    ('{GYM}', 'gym', NULL), ('{POOL}', 'pool', NULL), ('{SAUNA}', 'sauna', now());
INSERT INTO "{schema}"."property" (id, name, organisation_id, facility_ids, deleted_at) VALUES
    ('00000000-0000-4000-8000-000000000021', 'Alpha', '{ACME}', '["{POOL}", "{SAUNA}", "{GYM}"]', NULL),
    ('00000000-0000-4000-8000-000000000022', 'Beta', '{DEFUNCT}', '[]', NULL),
    ('00000000-0000-4000-8000-000000000023', 'Closed', '{ACME}', '["{GYM}"]', now());
INSERT INTO "{schema}"."space" (property_id, name, deleted_at) VALUES
    ('00000000-0000-4000-8000-000000000021', 'Studio B', NULL),
    ('00000000-0000-4000-8000-000000000021', 'Studio A', NULL),
    ('00000000-0000-4000-8000-000000000021', 'Old store', now()),
    ('00000000-0000-4000-8000-000000000023', 'Hidden', NULL);
"#
        ))
        .await
        .unwrap();

    rebuild(&mut driver, &listing_view(&schema, &["name"])).await.unwrap();

    let rows = listing_rows(&mut check, &schema).await;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["name"], json!("Alpha"));
    assert_eq!(rows[0]["facilities"], json!([{ "name": "pool" }, { "name": "gym" }]));
    assert_eq!(rows[0]["spaces"], json!([{ "name": "Studio A" }, { "name": "Studio B" }]));
    assert_eq!(rows[0]["organisation"], json!({ "id": ACME, "name": "Acme" }));
    assert_eq!(rows[1]["name"], json!("Beta"));
    assert_eq!(rows[1]["facilities"], json!([]));
    assert_eq!(rows[1]["spaces"], json!([]));
    assert_eq!(rows[1]["organisation"], Value::Null);

    let err = rebuild(&mut driver, &listing_view(&schema, &["name", "floor_area"]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RebuildFailure { step: 2, .. }));
    assert_eq!(listing_rows(&mut check, &schema).await, rows);

    driver
        .execute_raw(&format!("DROP SCHEMA \"{schema}\" CASCADE"))
        .await
        .unwrap();
    driver.close().await.unwrap();
    check.close().await.unwrap();
}
