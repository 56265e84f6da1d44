//! Migrations of the property and tenancy domain.
//!
//! Units are listed oldest first; [`runner`] sorts and validates them anyway.

mod m20230301090000_create_reference_tables;
mod m20230301090500_create_properties;
mod m20230415120000_create_applications;
mod m20230612100000_reorder_application_status;
mod m20230720150000_create_public_views;
mod m20230905110000_add_space_accessibility;
pub mod views;

use crate::error::Result;
use crate::migrate::{MigrationUnit, Runner, RunnerConfig};

/// Schema holding the public projection views.
pub const PUBLIC_API_SCHEMA: &str = "public_api";

/// Every migration unit, oldest first.
pub fn units() -> Result<Vec<MigrationUnit>> {
    Ok(vec![
        m20230301090000_create_reference_tables::unit()?,
        m20230301090500_create_properties::unit()?,
        m20230415120000_create_applications::unit()?,
        m20230612100000_reorder_application_status::unit()?,
        m20230720150000_create_public_views::unit()?,
        m20230905110000_add_space_accessibility::unit()?,
    ])
}

/// A runner over [`units`].
pub fn runner(config: RunnerConfig) -> Result<Runner> {
    Runner::with_config(units()?, config)
}

pub use m20230415120000_create_applications::{APPLICATION_STATUS, INITIAL_STATUS_ORDER};
pub use m20230612100000_reorder_application_status::REVIEW_STATUS_ORDER;
