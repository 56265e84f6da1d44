//! Materialized projection views.
//!
//! Views are never patched. A rebuild drops the view (its indexes go with
//! it), creates it again from its projection, and recreates every index,
//! all inside one transaction so a failed create leaves the old view.

use tracing::{error, info};

use crate::ast::{MaterializedView, SchemaOp, Transformation};
use crate::driver::Driver;
use crate::error::{Error, Result};
use crate::migrate::execute_in_transaction;

/// Drop-and-create transformation for a view and its indexes.
pub fn rebuild_transformation(view: &MaterializedView) -> Result<Transformation> {
    view.validate()?;
    let mut steps = Transformation::new()
        .op(SchemaOp::DropMaterializedView {
            name: view.name.clone(),
            if_exists: true,
        })
        .op(SchemaOp::CreateMaterializedView {
            name: view.name.clone(),
            query: view.query.clone(),
        });
    for index in &view.indexes {
        steps = steps.op(SchemaOp::create_index(index.clone()));
    }
    Ok(steps)
}

/// Transformation that removes a view.
pub fn drop_transformation(view: &MaterializedView) -> Result<Transformation> {
    view.name.validate()?;
    Ok(Transformation::new().op(SchemaOp::DropMaterializedView {
        name: view.name.clone(),
        if_exists: true,
    }))
}

/// Rebuild a view outside the migration runner.
pub async fn rebuild<D: Driver>(driver: &mut D, view: &MaterializedView) -> Result<()> {
    let steps = rebuild_transformation(view)?;
    info!(view = %view.name, indexes = view.indexes.len(), "rebuilding view");
    execute_in_transaction(driver, &steps).await.map_err(|failure| {
        error!(view = %view.name, step = failure.step, error = %failure.source, "view rebuild failed");
        Error::RebuildFailure {
            view: view.name.to_string(),
            step: failure.step,
            source: failure.source,
        }
    })
}
