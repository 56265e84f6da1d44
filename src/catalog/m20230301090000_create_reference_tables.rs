//! Reference data: organisation types, organisations, facilities.

use crate::ast::{ColumnDef, DataType, IndexDef, SchemaOp, TableDef, Transformation};
use crate::error::Result;
use crate::migrate::MigrationUnit;

pub fn unit() -> Result<MigrationUnit> {
    let up = Transformation::new()
        .op(SchemaOp::CreateExtension {
            name: "postgis".into(),
            if_not_exists: true,
        })
        .op(SchemaOp::create_table(
            TableDef::new("public.organisation_type")
                .column(ColumnDef::id())
                .column(ColumnDef::new("name", DataType::Text).not_null().unique())
                .column(ColumnDef::deleted_at()),
        ))
        .op(SchemaOp::create_table(
            TableDef::new("public.organisation")
                .column(ColumnDef::id())
                .column(ColumnDef::new("name", DataType::Text).not_null())
                .column(
                    ColumnDef::new("organisation_type_id", DataType::Uuid)
                        .references("public.organisation_type", "id"),
                )
                .column(ColumnDef::created_at())
                .column(ColumnDef::deleted_at()),
        ))
        .op(SchemaOp::create_index(IndexDef::new(
            "idx_organisation_organisation_type_id",
            "public.organisation",
            ["organisation_type_id"],
        )))
        .op(SchemaOp::create_table(
            TableDef::new("public.facility")
                .column(ColumnDef::id())
                .column(ColumnDef::new("name", DataType::Text).not_null())
                .column(ColumnDef::deleted_at()),
        ));

    // postgis is left installed.
    let down = Transformation::new()
        .op(SchemaOp::drop_table("public.facility"))
        .op(SchemaOp::drop_table("public.organisation"))
        .op(SchemaOp::drop_table("public.organisation_type"));

    MigrationUnit::new("20230301090000_create_reference_tables", up, down)
}
