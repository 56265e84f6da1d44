//! Running a transformation against a driver.

use tracing::{debug, warn};

use crate::ast::{QualifiedName, Step, Transformation};
use crate::driver::Driver;
use crate::error::StepError;
use crate::migrate::{LedgerEntry, Version};
use crate::transpiler::ToSql;

/// Where a transformation stopped. `step` is 1-based; 0 means the
/// transaction never opened and `len + 1` means the ledger write or commit.
#[derive(Debug)]
pub struct StepFailure {
    pub step: usize,
    pub source: StepError,
}

/// Ledger change committed together with a transformation.
pub(crate) enum LedgerChange<'a> {
    Append(&'a QualifiedName, LedgerEntry),
    Remove(&'a QualifiedName, Version),
}

async fn run_step<D: Driver>(driver: &mut D, step: &Step) -> Result<(), StepError> {
    match step {
        Step::Op(op) => {
            debug!(sql = %op.to_sql(), "step");
            driver.execute(op).await.map_err(|source| StepError::Statement {
                sql: op.to_sql(),
                source,
            })
        }
        Step::ExpectEnumOrder { type_name, labels } => {
            let actual = driver
                .enum_labels(type_name)
                .await
                .map_err(StepError::Transaction)?
                .ok_or_else(|| StepError::MissingEnum(type_name.to_string()))?;
            if &actual != labels {
                return Err(StepError::OrderDrift {
                    type_name: type_name.to_string(),
                    expected: labels.clone(),
                    actual,
                });
            }
            Ok(())
        }
    }
}

async fn run_all<D: Driver>(
    driver: &mut D,
    transformation: &Transformation,
    ledger: Option<LedgerChange<'_>>,
) -> Result<(), StepFailure> {
    for (i, step) in transformation.steps().iter().enumerate() {
        run_step(driver, step)
            .await
            .map_err(|source| StepFailure { step: i + 1, source })?;
    }
    let after = transformation.len() + 1;
    let recorded = match ledger {
        Some(LedgerChange::Append(table, entry)) => driver.append_ledger(table, &entry).await,
        Some(LedgerChange::Remove(table, version)) => driver.remove_ledger(table, version).await,
        None => Ok(()),
    };
    recorded.map_err(|e| StepFailure {
        step: after,
        source: StepError::Transaction(e),
    })?;
    driver.commit().await.map_err(|e| StepFailure {
        step: after,
        source: StepError::Transaction(e),
    })
}

pub(crate) async fn execute_with_ledger<D: Driver>(
    driver: &mut D,
    transformation: &Transformation,
    ledger: Option<LedgerChange<'_>>,
) -> Result<(), StepFailure> {
    driver.begin().await.map_err(|e| StepFailure {
        step: 0,
        source: StepError::Transaction(e),
    })?;
    let result = run_all(driver, transformation, ledger).await;
    if result.is_err() {
        if let Err(e) = driver.rollback().await {
            warn!(error = %e, "rollback after failed step");
        }
    }
    result
}

/// Run every step inside one transaction: all of them take effect or none.
pub async fn execute_in_transaction<D: Driver>(
    driver: &mut D,
    transformation: &Transformation,
) -> Result<(), StepFailure> {
    execute_with_ledger(driver, transformation, None).await
}
