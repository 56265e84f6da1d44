//! SQL transpiler for the schema AST.
//!
//! Converts typed schema operations and projection queries into PostgreSQL
//! statements. Every identifier is quoted on output; callers validate them
//! against the allow-list first (see [`crate::ident`]).

pub mod ddl;
pub mod projection;

pub use crate::ident::{quote_identifier, quote_literal};

/// Trait for converting AST nodes to SQL.
pub trait ToSql {
    /// Convert this node to a PostgreSQL string.
    fn to_sql(&self) -> String;
}
