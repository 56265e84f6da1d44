//! Versioned migrations.
//!
//! Submodules:
//! - `version`: `YYYYMMDDHHMMSS[_name]` versions
//! - `unit`: reversible migration units
//! - `ledger`: applied-unit records and the ledger table
//! - `exec`: transactional execution of a transformation
//! - `runner`: ordered apply, rollback, status and plan

mod exec;
mod ledger;
mod runner;
mod unit;
mod version;

pub use exec::{execute_in_transaction, StepFailure};
pub use ledger::{ledger_table_def, Ledger, LedgerEntry};
pub use runner::{
    ApplyReport, PlannedUnit, RollbackReport, Runner, RunnerConfig, UnitState, UnitStatus,
    DEFAULT_LEDGER_TABLE, DEFAULT_LOCK_KEY,
};
pub use unit::{Direction, MigrationUnit};
pub use version::{parse_unit_id, Version};

pub(crate) use exec::{execute_with_ledger, LedgerChange};
