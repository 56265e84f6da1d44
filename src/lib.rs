//! strata: versioned, reversible PostgreSQL schema evolution.
//!
//! Schema changes are typed [`ast::SchemaOp`] values grouped into
//! [`ast::Transformation`]s and compiled to SQL by the [`transpiler`].
//! A [`migrate::Runner`] applies [`migrate::MigrationUnit`]s in strict
//! version order, recording each one in a ledger table and holding an
//! advisory lock for the whole run.
//!
//! Two transformation generators carry most of the weight:
//!
//! - [`enum_reorder`] permutes the declared order of a native enum type
//!   without changing the value of any stored row.
//! - [`views`] drops and recreates materialized projection views built from
//!   a typed [`ast::ProjectionQuery`].
//!
//! ```
//! use strata::enum_reorder::reorder;
//!
//! let old = ["DRAFT", "SUBMITTED", "APPROVED"];
//! let new = ["SUBMITTED", "APPROVED", "DRAFT"];
//! let steps = reorder("public.application", "status", "public.application_status", old, new).unwrap();
//! assert!(steps.to_sql().iter().any(|sql| sql.contains("RENAME VALUE")));
//! ```

pub mod ast;
pub mod catalog;
pub mod config;
pub mod driver;
pub mod enum_reorder;
pub mod error;
pub mod ident;
pub mod migrate;
pub mod transpiler;
pub mod views;

pub use error::{Error, Result, StepError};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::ast::*;
    pub use crate::driver::{Driver, DriverError, MemoryDatabase, MemoryDriver, PgDriver};
    pub use crate::enum_reorder::{EnumReorder, reorder};
    pub use crate::error::{Error, Result, StepError};
    pub use crate::migrate::{Direction, Ledger, LedgerEntry, MigrationUnit, Runner, RunnerConfig, Version};
    pub use crate::transpiler::ToSql;
}
