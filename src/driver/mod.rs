//! Database drivers.
//!
//! [`Driver`] is the seam between the migration engine and a database
//! session. [`PgDriver`] talks to PostgreSQL over `sqlx`; [`MemoryDriver`]
//! simulates the parts of the PostgreSQL catalog that schema evolution
//! touches and backs the test suites and offline plans.

mod memory;
mod pg;

pub use memory::{CatalogObjects, MemoryDatabase, MemoryDriver};
pub use pg::PgDriver;

use thiserror::Error;

use crate::ast::{QualifiedName, SchemaOp};
use crate::migrate::{LedgerEntry, Version};

/// Error type for driver operations.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Connection, protocol or server error from PostgreSQL.
    #[error("database error: {0}")]
    Sql(#[from] sqlx::Error),

    /// The simulated catalog refused a statement.
    #[error("{0}")]
    Rejected(String),

    #[error("no transaction in progress")]
    NoTransaction,

    #[error("a transaction is already in progress")]
    TransactionOpen,

    #[error("advisory lock {0} is not held by this session")]
    LockNotHeld(i64),

    /// A ledger row could not be decoded.
    #[error("malformed ledger row: {0}")]
    Ledger(String),
}

/// Result type for driver operations.
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// A single database session.
///
/// Statements outside `begin`/`commit` run in autocommit mode. A failed
/// statement inside a transaction aborts it: everything until `rollback`
/// is refused.
#[allow(async_fn_in_trait)]
pub trait Driver {
    /// Block until the session-level advisory lock `key` is held.
    async fn acquire_lock(&mut self, key: i64) -> DriverResult<()>;

    async fn release_lock(&mut self, key: i64) -> DriverResult<()>;

    async fn begin(&mut self) -> DriverResult<()>;

    async fn commit(&mut self) -> DriverResult<()>;

    async fn rollback(&mut self) -> DriverResult<()>;

    /// Run one schema operation.
    async fn execute(&mut self, op: &SchemaOp) -> DriverResult<()>;

    /// Labels of an enum type in declared order, `None` if the type is missing.
    async fn enum_labels(&mut self, type_name: &QualifiedName) -> DriverResult<Option<Vec<String>>>;

    /// Ledger rows ordered by version. A missing ledger table reads as empty.
    async fn ledger_entries(&mut self, table: &QualifiedName) -> DriverResult<Vec<LedgerEntry>>;

    async fn append_ledger(&mut self, table: &QualifiedName, entry: &LedgerEntry) -> DriverResult<()>;

    async fn remove_ledger(&mut self, table: &QualifiedName, version: Version) -> DriverResult<()>;
}
