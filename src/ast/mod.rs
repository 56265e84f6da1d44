//! Typed schema operations.
//!
//! Every change to the database is a value: a [`SchemaOp`] or a guard
//! [`Step`], grouped into a [`Transformation`]. Nothing here talks to a
//! database; see [`crate::transpiler`] for SQL and [`crate::driver`] for
//! execution.

mod index;
mod name;
mod op;
mod projection;
mod table;
mod types;

pub use index::{IndexDef, IndexMethod};
pub use name::{QualifiedName, DEFAULT_SCHEMA};
pub use op::{EnumPosition, SchemaOp, Step, Transformation};
pub use projection::{Children, Expand, Field, MaterializedView, Nested, Parent, ProjectionQuery, Root};
pub use table::{ColumnDef, OnDelete, References, TableDef};
pub use types::{DataType, DefaultValue, GeometryKind};
