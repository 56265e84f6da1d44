//! Read-only projections for the public listing endpoints.

use crate::ast::{SchemaOp, Transformation};
use crate::error::Result;
use crate::migrate::MigrationUnit;
use crate::views::{drop_transformation, rebuild_transformation};

use super::views;
use super::PUBLIC_API_SCHEMA;

pub fn unit() -> Result<MigrationUnit> {
    let property_listing = views::property_listing_v1();
    let organisation_listing = views::organisation_listing();

    let up = Transformation::new()
        .op(SchemaOp::create_schema(PUBLIC_API_SCHEMA))
        .then(rebuild_transformation(&property_listing)?)
        .then(rebuild_transformation(&organisation_listing)?);

    let down = drop_transformation(&organisation_listing)?
        .then(drop_transformation(&property_listing)?)
        .op(SchemaOp::drop_schema(PUBLIC_API_SCHEMA));

    MigrationUnit::new("20230720150000_create_public_views", up, down)
}
