use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ast::{ColumnDef, DataType, DefaultValue, IndexDef, ProjectionQuery, QualifiedName, TableDef};
use crate::error::Result;
use crate::ident::{validate_identifier, validate_label};

/// One data-definition (or data-migration) statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SchemaOp {
    CreateSchema { name: String, if_not_exists: bool },
    DropSchema { name: String, if_exists: bool },
    CreateExtension { name: String, if_not_exists: bool },
    DropExtension { name: String, if_exists: bool },
    CreateTable(TableDef),
    DropTable { table: QualifiedName, if_exists: bool },
    AddColumn { table: QualifiedName, column: ColumnDef },
    DropColumn { table: QualifiedName, column: String },
    RenameColumn { table: QualifiedName, from: String, to: String },
    /// `ALTER COLUMN .. SET DEFAULT` or, with `None`, `DROP DEFAULT`.
    SetDefault {
        table: QualifiedName,
        column: String,
        default: Option<DefaultValue>,
    },
    /// `UPDATE table SET target = source::cast`.
    Backfill {
        table: QualifiedName,
        target: String,
        source: String,
        cast: DataType,
    },
    CreateEnum { name: QualifiedName, labels: Vec<String> },
    DropEnum { name: QualifiedName, if_exists: bool },
    RenameEnumValue { type_name: QualifiedName, from: String, to: String },
    AddEnumValue {
        type_name: QualifiedName,
        label: String,
        position: Option<EnumPosition>,
    },
    CreateIndex(IndexDef),
    DropIndex { name: QualifiedName, if_exists: bool },
    CreateMaterializedView { name: QualifiedName, query: ProjectionQuery },
    DropMaterializedView { name: QualifiedName, if_exists: bool },
}

/// Placement of a new enum label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnumPosition {
    Before(String),
    After(String),
}

impl SchemaOp {
    pub fn create_schema(name: impl Into<String>) -> Self {
        SchemaOp::CreateSchema {
            name: name.into(),
            if_not_exists: true,
        }
    }

    pub fn drop_schema(name: impl Into<String>) -> Self {
        SchemaOp::DropSchema {
            name: name.into(),
            if_exists: true,
        }
    }

    pub fn create_table(table: TableDef) -> Self {
        SchemaOp::CreateTable(table)
    }

    pub fn drop_table(table: impl Into<QualifiedName>) -> Self {
        SchemaOp::DropTable {
            table: table.into(),
            if_exists: false,
        }
    }

    pub fn add_column(table: impl Into<QualifiedName>, column: ColumnDef) -> Self {
        SchemaOp::AddColumn {
            table: table.into(),
            column,
        }
    }

    pub fn drop_column(table: impl Into<QualifiedName>, column: impl Into<String>) -> Self {
        SchemaOp::DropColumn {
            table: table.into(),
            column: column.into(),
        }
    }

    pub fn rename_column(
        table: impl Into<QualifiedName>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        SchemaOp::RenameColumn {
            table: table.into(),
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn create_enum<I, S>(name: impl Into<QualifiedName>, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SchemaOp::CreateEnum {
            name: name.into(),
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    pub fn drop_enum(name: impl Into<QualifiedName>) -> Self {
        SchemaOp::DropEnum {
            name: name.into(),
            if_exists: false,
        }
    }

    pub fn rename_enum_value(
        type_name: impl Into<QualifiedName>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        SchemaOp::RenameEnumValue {
            type_name: type_name.into(),
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn create_index(index: IndexDef) -> Self {
        SchemaOp::CreateIndex(index)
    }

    pub fn drop_index(name: impl Into<QualifiedName>) -> Self {
        SchemaOp::DropIndex {
            name: name.into(),
            if_exists: true,
        }
    }

    /// Check every identifier and label the statement would interpolate.
    pub fn validate(&self) -> Result<()> {
        match self {
            SchemaOp::CreateSchema { name, .. }
            | SchemaOp::DropSchema { name, .. }
            | SchemaOp::CreateExtension { name, .. }
            | SchemaOp::DropExtension { name, .. } => validate_identifier(name),
            SchemaOp::CreateTable(table) => table.validate(),
            SchemaOp::DropTable { table, .. } => table.validate(),
            SchemaOp::AddColumn { table, column } => {
                table.validate()?;
                column.validate()
            }
            SchemaOp::DropColumn { table, column } => {
                table.validate()?;
                validate_identifier(column)
            }
            SchemaOp::RenameColumn { table, from, to } => {
                table.validate()?;
                validate_identifier(from)?;
                validate_identifier(to)
            }
            SchemaOp::SetDefault { table, column, default } => {
                table.validate()?;
                validate_identifier(column)?;
                match default {
                    Some(default) => default.validate(),
                    None => Ok(()),
                }
            }
            SchemaOp::Backfill { table, target, source, cast } => {
                table.validate()?;
                validate_identifier(target)?;
                validate_identifier(source)?;
                cast.validate()
            }
            SchemaOp::CreateEnum { name, labels } => {
                name.validate()?;
                labels.iter().try_for_each(|l| validate_label(l))
            }
            SchemaOp::DropEnum { name, .. } => name.validate(),
            SchemaOp::RenameEnumValue { type_name, from, to } => {
                type_name.validate()?;
                validate_label(from)?;
                validate_label(to)
            }
            SchemaOp::AddEnumValue { type_name, label, position } => {
                type_name.validate()?;
                validate_label(label)?;
                match position {
                    Some(EnumPosition::Before(l)) | Some(EnumPosition::After(l)) => validate_label(l),
                    None => Ok(()),
                }
            }
            SchemaOp::CreateIndex(index) => index.validate(),
            SchemaOp::DropIndex { name, .. } => name.validate(),
            SchemaOp::CreateMaterializedView { name, query } => {
                name.validate()?;
                query.validate()
            }
            SchemaOp::DropMaterializedView { name, .. } => name.validate(),
        }
    }
}

impl fmt::Display for SchemaOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaOp::CreateSchema { name, .. } => write!(f, "create schema {}", name),
            SchemaOp::DropSchema { name, .. } => write!(f, "drop schema {}", name),
            SchemaOp::CreateExtension { name, .. } => write!(f, "create extension {}", name),
            SchemaOp::DropExtension { name, .. } => write!(f, "drop extension {}", name),
            SchemaOp::CreateTable(table) => write!(f, "create table {}", table.name),
            SchemaOp::DropTable { table, .. } => write!(f, "drop table {}", table),
            SchemaOp::AddColumn { table, column } => write!(f, "add column {}.{}", table, column.name),
            SchemaOp::DropColumn { table, column } => write!(f, "drop column {}.{}", table, column),
            SchemaOp::RenameColumn { table, from, to } => {
                write!(f, "rename column {}.{} -> {}", table, from, to)
            }
            SchemaOp::SetDefault { table, column, default } => match default {
                Some(_) => write!(f, "set default {}.{}", table, column),
                None => write!(f, "drop default {}.{}", table, column),
            },
            SchemaOp::Backfill { table, target, source, .. } => {
                write!(f, "backfill {}.{} from {}", table, target, source)
            }
            SchemaOp::CreateEnum { name, .. } => write!(f, "create type {}", name),
            SchemaOp::DropEnum { name, .. } => write!(f, "drop type {}", name),
            SchemaOp::RenameEnumValue { type_name, from, to } => {
                write!(f, "rename value {} '{}' -> '{}'", type_name, from, to)
            }
            SchemaOp::AddEnumValue { type_name, label, .. } => {
                write!(f, "add value {} '{}'", type_name, label)
            }
            SchemaOp::CreateIndex(index) => write!(f, "create index {}", index.qualified_name()),
            SchemaOp::DropIndex { name, .. } => write!(f, "drop index {}", name),
            SchemaOp::CreateMaterializedView { name, .. } => {
                write!(f, "create materialized view {}", name)
            }
            SchemaOp::DropMaterializedView { name, .. } => {
                write!(f, "drop materialized view {}", name)
            }
        }
    }
}

/// A unit of work inside a transformation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Step {
    Op(SchemaOp),
    /// Fails the transformation unless the live enum has exactly this order.
    ExpectEnumOrder {
        type_name: QualifiedName,
        labels: Vec<String>,
    },
}

impl Step {
    pub fn validate(&self) -> Result<()> {
        match self {
            Step::Op(op) => op.validate(),
            Step::ExpectEnumOrder { type_name, labels } => {
                type_name.validate()?;
                labels.iter().try_for_each(|l| validate_label(l))
            }
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Op(op) => write!(f, "{}", op),
            Step::ExpectEnumOrder { type_name, .. } => write!(f, "expect order of {}", type_name),
        }
    }
}

/// An ordered list of steps, run as one transaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transformation {
    steps: Vec<Step>,
}

impl Transformation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn op(mut self, op: SchemaOp) -> Self {
        self.steps.push(Step::Op(op));
        self
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Append another transformation's steps.
    pub fn then(mut self, other: Transformation) -> Self {
        self.steps.extend(other.steps);
        self
    }

    pub fn push(&mut self, step: Step) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        self.steps.iter().try_for_each(Step::validate)
    }
}

impl From<Vec<SchemaOp>> for Transformation {
    fn from(ops: Vec<SchemaOp>) -> Self {
        Self {
            steps: ops.into_iter().map(Step::Op).collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Transformation {
    type Item = &'a Step;
    type IntoIter = std::slice::Iter<'a, Step>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transformation_builder() {
        let t = Transformation::new()
            .op(SchemaOp::create_schema("public_api"))
            .op(SchemaOp::drop_column("public.space", "legacy"))
            .then(Transformation::from(vec![SchemaOp::drop_index("public.idx_space_name")]));

        assert_eq!(t.len(), 3);
        assert!(t.validate().is_ok());
        assert_eq!(t.steps()[1].to_string(), "drop column public.space.legacy");
    }

    #[test]
    fn test_validate_catches_bad_label() {
        let t = Transformation::new().op(SchemaOp::rename_enum_value(
            "public.status",
            "DRAFT",
            "x'; drop table y; --",
        ));
        assert!(t.validate().is_err());
    }
}
