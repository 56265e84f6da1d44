//! Put application statuses in review order.

use crate::enum_reorder::EnumReorder;
use crate::error::Result;
use crate::migrate::MigrationUnit;

use super::{APPLICATION_STATUS, INITIAL_STATUS_ORDER};

pub const REVIEW_STATUS_ORDER: [&str; 6] =
    ["SUBMITTED", "CREATED", "RETURNED", "APPROVED", "REJECTED", "DRAFT"];

pub fn unit() -> Result<MigrationUnit> {
    let reorder = EnumReorder::new(APPLICATION_STATUS, INITIAL_STATUS_ORDER, REVIEW_STATUS_ORDER)
        .column_with_default("public.application", "status", "DRAFT");

    MigrationUnit::new(
        "20230612100000_reorder_application_status",
        reorder.build()?,
        reorder.inverse().build()?,
    )
}
