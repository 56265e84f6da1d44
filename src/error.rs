//! Error types for strata.

use std::fmt;

use thiserror::Error;

use crate::driver::DriverError;
use crate::migrate::{Direction, Version};

/// Result alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Every failure an operator can see.
#[derive(Debug, Error)]
pub enum Error {
    /// An identifier failed the allow-list (lowercase snake case, at most 63 bytes).
    #[error("invalid identifier '{0}': expected lowercase snake_case of at most 63 bytes")]
    InvalidIdentifier(String),

    /// An enum label failed the allow-list.
    #[error("invalid enum label '{0}': expected [A-Za-z0-9_ -] of at most 63 bytes")]
    InvalidLabel(String),

    /// A label appears twice in one ordering.
    #[error("enum label '{label}' appears more than once in an ordering of {type_name}")]
    DuplicateLabel { type_name: String, label: String },

    /// Enum reorder precondition: both orderings must hold the same labels.
    #[error(
        "label set mismatch reordering {type_name}: missing {missing:?}, unexpected {unexpected:?}"
    )]
    ValueSetMismatch {
        type_name: String,
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    /// A migration id did not parse as `YYYYMMDDHHMMSS[_name]`.
    #[error("invalid migration version '{0}': expected YYYYMMDDHHMMSS[_name]")]
    InvalidVersion(String),

    /// Two units share a version.
    #[error("duplicate migration version {0}")]
    DuplicateVersion(Version),

    /// An apply or rollback would leave the strict version sequence.
    #[error("migration {version} is out of sequence: {reason}")]
    OrderingViolation {
        version: Version,
        reason: OrderingReason,
    },

    /// `apply` was asked to stop at a version no unit carries.
    #[error("unknown migration target {0}")]
    UnknownTarget(Version),

    /// A step inside a unit's transaction failed; the transaction was rolled back.
    #[error("migration {version} failed running {direction} at step {step}: {source}")]
    TransformationFailure {
        version: Version,
        direction: Direction,
        step: usize,
        source: StepError,
    },

    /// A standalone view rebuild failed; the previous view is left in place.
    #[error("rebuild of view {view} failed at step {step}: {source}")]
    RebuildFailure {
        view: String,
        step: usize,
        source: StepError,
    },

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("config error in {path}: {message}")]
    Config { path: String, message: String },
}

/// Why a unit is out of sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderingReason {
    /// The ledger records a version that no known unit carries.
    UnknownApplied,
    /// A known unit was never applied but a later one was.
    Gap { latest: Version },
    /// The requested target is older than the latest applied unit.
    TargetBehind { latest: Version },
    /// Still pending while an operation needs every unit applied.
    NotApplied,
}

impl fmt::Display for OrderingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderingReason::UnknownApplied => {
                write!(f, "recorded in the ledger but not known to this runner")
            }
            OrderingReason::Gap { latest } => {
                write!(f, "pending but older than applied migration {}", latest)
            }
            OrderingReason::TargetBehind { latest } => write!(
                f,
                "target is older than applied migration {}; roll back instead",
                latest
            ),
            OrderingReason::NotApplied => write!(f, "not applied yet; migrate before rebuilding views"),
        }
    }
}

/// A single step of a transformation that did not complete.
#[derive(Debug, Error)]
pub enum StepError {
    /// The compiled statement was rejected by the database.
    #[error("statement failed: {source}\n  sql: {sql}")]
    Statement { sql: String, source: DriverError },

    /// The live enum order differs from the order a reorder assumed.
    #[error("enum {type_name} has order {actual:?}, expected {expected:?}")]
    OrderDrift {
        type_name: String,
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("enum type {0} does not exist")]
    MissingEnum(String),

    /// Opening, committing, or recording the transaction failed.
    #[error("transaction failed: {0}")]
    Transaction(DriverError),
}
