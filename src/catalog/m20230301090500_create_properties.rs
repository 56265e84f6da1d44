//! Properties, their spaces, and tenancies.

use crate::ast::{
    ColumnDef, DataType, DefaultValue, GeometryKind, IndexDef, IndexMethod, OnDelete, SchemaOp,
    TableDef, Transformation,
};
use crate::error::Result;
use crate::migrate::MigrationUnit;

pub fn unit() -> Result<MigrationUnit> {
    let up = Transformation::new()
        .op(SchemaOp::create_table(
            TableDef::new("public.property")
                .column(ColumnDef::id())
                .column(ColumnDef::new("name", DataType::Text).not_null())
                .column(
                    ColumnDef::new("organisation_id", DataType::Uuid)
                        .not_null()
                        .references("public.organisation", "id"),
                )
                .column(ColumnDef::new(
                    "location",
                    DataType::Geometry {
                        kind: GeometryKind::Point,
                        srid: 4326,
                    },
                ))
                .column(
                    ColumnDef::new("facility_ids", DataType::Jsonb)
                        .not_null()
                        .default(DefaultValue::EmptyJsonArray),
                )
                .column(ColumnDef::created_at())
                .column(ColumnDef::deleted_at()),
        ))
        .op(SchemaOp::create_index(IndexDef::new(
            "idx_property_organisation_id",
            "public.property",
            ["organisation_id"],
        )))
        .op(SchemaOp::create_index(
            IndexDef::new("idx_property_location", "public.property", ["location"]).using(IndexMethod::Gist),
        ))
        .op(SchemaOp::create_table(
            TableDef::new("public.space")
                .column(ColumnDef::id())
                .column(
                    ColumnDef::new("property_id", DataType::Uuid)
                        .not_null()
                        .references("public.property", "id")
                        .on_delete(OnDelete::Cascade),
                )
                .column(ColumnDef::new("name", DataType::Text).not_null())
                .column(ColumnDef::new(
                    "floor_area",
                    DataType::Numeric {
                        precision: 10,
                        scale: 2,
                    },
                ))
                .column(ColumnDef::deleted_at()),
        ))
        .op(SchemaOp::create_index(IndexDef::new(
            "idx_space_property_id",
            "public.space",
            ["property_id"],
        )))
        .op(SchemaOp::create_table(
            TableDef::new("public.tenancy")
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
                .column(ColumnDef::new("starts_on", DataType::Date).not_null())
                .column(ColumnDef::new("ends_on", DataType::Date))
                .column(ColumnDef::deleted_at()),
        ))
        .op(SchemaOp::create_index(IndexDef::new(
            "idx_tenancy_property_id",
            "public.tenancy",
            ["property_id"],
        )))
        .op(SchemaOp::create_index(IndexDef::new(
            "idx_tenancy_organisation_id",
            "public.tenancy",
            ["organisation_id"],
        )));

    let down = Transformation::new()
        .op(SchemaOp::drop_table("public.tenancy"))
        .op(SchemaOp::drop_table("public.space"))
        .op(SchemaOp::drop_table("public.property"));

    MigrationUnit::new("20230301090500_create_properties", up, down)
}
