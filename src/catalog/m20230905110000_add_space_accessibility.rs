//! Step-free access flag on spaces, surfaced in the property listing.

use crate::ast::{ColumnDef, DataType, DefaultValue, SchemaOp, Transformation};
use crate::error::Result;
use crate::migrate::MigrationUnit;
use crate::views::rebuild_transformation;

use super::views;

pub fn unit() -> Result<MigrationUnit> {
    let up = Transformation::new()
        .op(SchemaOp::add_column(
            "public.space",
            ColumnDef::new("accessible", DataType::Boolean)
                .not_null()
                .default(DefaultValue::Bool(false)),
        ))
        .then(rebuild_transformation(&views::property_listing_v2())?);

    // v2 reads the column; put v1 back before dropping it.
    let down = rebuild_transformation(&views::property_listing_v1())?
        .op(SchemaOp::drop_column("public.space", "accessible"));

    MigrationUnit::new("20230905110000_add_space_accessibility", up, down)
}
