//! Reordering the labels of a native enum type.
//!
//! PostgreSQL cannot reorder enum members, only rename them. A member keeps
//! its oid (and so its sort position) across renames, and rows store the
//! oid. The reorder therefore renames the members in place so position `i`
//! carries `new[i]`, and re-derives every bound column from a text copy
//! taken before the renames:
//!
//! 1. guard: the live order is still `old`
//! 2. per column: drop its default, add `<column>_reorder_shadow text`,
//!    copy `column::text` into it
//! 3. rename each label whose position changes to a temporary one
//! 4. rename each temporary label to its new name
//! 5. per column: `column = shadow::type`, drop the shadow, restore the default
//!
//! Every row reads back the same label it had before. The inverse is the
//! same algorithm with the orders swapped.

use std::collections::BTreeSet;

use tracing::debug;

use crate::ast::{
    ColumnDef, DataType, DefaultValue, QualifiedName, SchemaOp, Step, Transformation,
};
use crate::error::{Error, Result};
use crate::ident::{validate_identifier, validate_label, MAX_NAME_LEN};

/// Suffix of the text column holding a row's label during a reorder.
pub const SHADOW_SUFFIX: &str = "_reorder_shadow";

/// A column of the enum type that must keep its values.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnBinding {
    pub table: QualifiedName,
    pub column: String,
    /// Label of the column's default, restored after the renames.
    pub default: Option<String>,
}

impl ColumnBinding {
    pub fn shadow_column(&self) -> String {
        format!("{}{}", self.column, SHADOW_SUFFIX)
    }
}

/// Builder for an enum reorder transformation.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumReorder {
    type_name: QualifiedName,
    old: Vec<String>,
    new: Vec<String>,
    bindings: Vec<ColumnBinding>,
}

fn labels<I, S>(labels: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    labels.into_iter().map(Into::into).collect()
}

impl EnumReorder {
    pub fn new<I, J, S, T>(type_name: impl Into<QualifiedName>, old: I, new: J) -> Self
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        Self {
            type_name: type_name.into(),
            old: labels(old),
            new: labels(new),
            bindings: Vec::new(),
        }
    }

    pub fn column(mut self, table: impl Into<QualifiedName>, column: impl Into<String>) -> Self {
        self.bindings.push(ColumnBinding {
            table: table.into(),
            column: column.into(),
            default: None,
        });
        self
    }

    /// Bind a column whose default is an enum label.
    pub fn column_with_default(
        mut self,
        table: impl Into<QualifiedName>,
        column: impl Into<String>,
        default: impl Into<String>,
    ) -> Self {
        self.bindings.push(ColumnBinding {
            table: table.into(),
            column: column.into(),
            default: Some(default.into()),
        });
        self
    }

    pub fn type_name(&self) -> &QualifiedName {
        &self.type_name
    }

    pub fn old_order(&self) -> &[String] {
        &self.old
    }

    pub fn new_order(&self) -> &[String] {
        &self.new
    }

    pub fn bindings(&self) -> &[ColumnBinding] {
        &self.bindings
    }

    /// The reorder that undoes this one.
    pub fn inverse(&self) -> Self {
        Self {
            type_name: self.type_name.clone(),
            old: self.new.clone(),
            new: self.old.clone(),
            bindings: self.bindings.clone(),
        }
    }

    /// Check identifiers, labels, and that both orders hold the same set.
    pub fn validate(&self) -> Result<()> {
        self.type_name.validate()?;
        for binding in &self.bindings {
            binding.table.validate()?;
            validate_identifier(&binding.column)?;
            validate_identifier(&binding.shadow_column())?;
        }
        for order in [&self.old, &self.new] {
            let mut seen = BTreeSet::new();
            for label in order {
                validate_label(label)?;
                if !seen.insert(label.as_str()) {
                    return Err(Error::DuplicateLabel {
                        type_name: self.type_name.to_string(),
                        label: label.clone(),
                    });
                }
            }
        }

        let old: BTreeSet<&str> = self.old.iter().map(String::as_str).collect();
        let new: BTreeSet<&str> = self.new.iter().map(String::as_str).collect();
        let missing: Vec<String> = old.difference(&new).map(|l| l.to_string()).collect();
        let mut unexpected: Vec<String> = new.difference(&old).map(|l| l.to_string()).collect();
        for binding in &self.bindings {
            if let Some(default) = &binding.default {
                validate_label(default)?;
                if !old.contains(default.as_str()) && !unexpected.contains(default) {
                    unexpected.push(default.clone());
                }
            }
        }
        if !missing.is_empty() || !unexpected.is_empty() {
            return Err(Error::ValueSetMismatch {
                type_name: self.type_name.to_string(),
                missing,
                unexpected,
            });
        }
        Ok(())
    }

    /// Produce the transformation. Fails without producing anything when
    /// the orders are not permutations of each other.
    pub fn build(&self) -> Result<Transformation> {
        self.validate()?;

        let mut steps = Transformation::new().step(Step::ExpectEnumOrder {
            type_name: self.type_name.clone(),
            labels: self.old.clone(),
        });

        // Positions whose label changes; a member already holding its new
        // label keeps its name and is never renamed.
        let moved: Vec<usize> = (0..self.old.len())
            .filter(|&i| self.old[i] != self.new[i])
            .collect();
        if moved.is_empty() {
            debug!(type_name = %self.type_name, "enum already in requested order");
            return Ok(steps);
        }

        for binding in &self.bindings {
            if binding.default.is_some() {
                steps = steps.op(SchemaOp::SetDefault {
                    table: binding.table.clone(),
                    column: binding.column.clone(),
                    default: None,
                });
            }
            steps = steps
                .op(SchemaOp::add_column(
                    binding.table.clone(),
                    ColumnDef::new(binding.shadow_column(), DataType::Text),
                ))
                .op(SchemaOp::Backfill {
                    table: binding.table.clone(),
                    target: binding.shadow_column(),
                    source: binding.column.clone(),
                    cast: DataType::Text,
                });
        }

        let temporary = temporary_labels(&self.old);
        for &i in &moved {
            steps = steps.op(SchemaOp::rename_enum_value(
                self.type_name.clone(),
                self.old[i].clone(),
                temporary[i].clone(),
            ));
        }
        for &i in &moved {
            steps = steps.op(SchemaOp::rename_enum_value(
                self.type_name.clone(),
                temporary[i].clone(),
                self.new[i].clone(),
            ));
        }

        for binding in &self.bindings {
            steps = steps
                .op(SchemaOp::Backfill {
                    table: binding.table.clone(),
                    target: binding.column.clone(),
                    source: binding.shadow_column(),
                    cast: DataType::Enum(self.type_name.clone()),
                })
                .op(SchemaOp::drop_column(binding.table.clone(), binding.shadow_column()));
            if let Some(default) = &binding.default {
                steps = steps.op(SchemaOp::SetDefault {
                    table: binding.table.clone(),
                    column: binding.column.clone(),
                    default: Some(DefaultValue::EnumLabel(default.clone())),
                });
            }
        }

        debug!(
            type_name = %self.type_name,
            moved = moved.len(),
            columns = self.bindings.len(),
            steps = steps.len(),
            "enum reorder planned"
        );
        steps.validate()?;
        Ok(steps)
    }
}

/// `old[i]__reorder_<i>`, with extra underscores until it clashes with nothing.
fn temporary_labels(labels: &[String]) -> Vec<String> {
    let mut taken: BTreeSet<String> = labels.iter().cloned().collect();
    labels
        .iter()
        .enumerate()
        .map(|(i, label)| {
            let mut separator = String::from("__");
            loop {
                let mut candidate = format!("{}{}reorder_{}", label, separator, i);
                if candidate.len() > MAX_NAME_LEN {
                    candidate = format!("{}reorder_{}", separator, i);
                }
                if taken.insert(candidate.clone()) {
                    return candidate;
                }
                separator.push('_');
            }
        })
        .collect()
}

/// Reorder `type_name` from `old` to `new`, preserving `table.column`.
pub fn reorder<I, J, S, T>(
    table: impl Into<QualifiedName>,
    column: impl Into<String>,
    type_name: impl Into<QualifiedName>,
    old: I,
    new: J,
) -> Result<Transformation>
where
    I: IntoIterator<Item = S>,
    J: IntoIterator<Item = T>,
    S: Into<String>,
    T: Into<String>,
{
    EnumReorder::new(type_name, old, new).column(table, column).build()
}
