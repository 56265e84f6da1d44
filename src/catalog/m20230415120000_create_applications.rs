//! Tenancy applications and their status enum.

use crate::ast::{ColumnDef, DataType, DefaultValue, IndexDef, SchemaOp, TableDef, Transformation};
use crate::error::Result;
use crate::migrate::MigrationUnit;

pub const APPLICATION_STATUS: &str = "public.application_status";

/// Declared order when the type was created.
pub const INITIAL_STATUS_ORDER: [&str; 6] =
    ["DRAFT", "CREATED", "RETURNED", "REJECTED", "APPROVED", "SUBMITTED"];

pub fn unit() -> Result<MigrationUnit> {
    let up = Transformation::new()
        .op(SchemaOp::create_enum(APPLICATION_STATUS, INITIAL_STATUS_ORDER))
        .op(SchemaOp::create_table(
            TableDef::new("public.application")
                .column(ColumnDef::id())
                .column(
                    ColumnDef::new("property_id", DataType::Uuid)
                        .not_null()
                        .references("public.property", "id"),
                )
                .column(
                    ColumnDef::new("organisation_id", DataType::Uuid)
                        .not_null()
                        .references("public.organisation", "id"),
                )
                .column(
                    ColumnDef::new("status", DataType::Enum(APPLICATION_STATUS.into()))
                        .not_null()
                        .default(DefaultValue::EnumLabel("DRAFT".into())),
                )
                .column(ColumnDef::new("submitted_at", DataType::Timestamptz))
                .column(ColumnDef::created_at())
                .column(ColumnDef::deleted_at()),
        ))
        .op(SchemaOp::create_index(IndexDef::new(
            "idx_application_status",
            "public.application",
            ["status"],
        )));

    let down = Transformation::new()
        .op(SchemaOp::drop_table("public.application"))
        .op(SchemaOp::drop_enum(APPLICATION_STATUS));

    MigrationUnit::new("20230415120000_create_applications", up, down)
}
