use serde::{Deserialize, Serialize};

use crate::ast::{DataType, DefaultValue, QualifiedName};
use crate::error::Result;
use crate::ident::validate_identifier;

/// A table definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: QualifiedName,
    pub columns: Vec<ColumnDef>,
    #[serde(default)]
    pub if_not_exists: bool,
}

/// A column definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub primary_key: bool,
    pub unique: bool,
    pub default: Option<DefaultValue>,
    pub references: Option<References>,
}

/// Foreign key target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct References {
    pub table: QualifiedName,
    pub column: String,
    pub on_delete: OnDelete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OnDelete {
    #[default]
    NoAction,
    Cascade,
    SetNull,
}

impl TableDef {
    pub fn new(name: impl Into<QualifiedName>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            if_not_exists: false,
        }
    }

    pub fn column(mut self, col: ColumnDef) -> Self {
        self.columns.push(col);
        self
    }

    pub fn if_not_exists(mut self) -> Self {
        self.if_not_exists = true;
        self
    }

    pub fn find_column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn validate(&self) -> Result<()> {
        self.name.validate()?;
        for col in &self.columns {
            col.validate()?;
        }
        Ok(())
    }
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            primary_key: false,
            unique: false,
            default: None,
            references: None,
        }
    }

    /// `uuid` primary key defaulting to `gen_random_uuid()`.
    pub fn id() -> Self {
        Self::new("id", DataType::Uuid)
            .primary_key()
            .default(DefaultValue::RandomUuid)
    }

    /// Nullable `deleted_at timestamptz`, the soft-deletion marker.
    pub fn deleted_at() -> Self {
        Self::new("deleted_at", DataType::Timestamptz)
    }

    /// `created_at timestamptz not null default now()`.
    pub fn created_at() -> Self {
        Self::new("created_at", DataType::Timestamptz)
            .not_null()
            .default(DefaultValue::Now)
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default(mut self, value: DefaultValue) -> Self {
        self.default = Some(value);
        self
    }

    pub fn references(mut self, table: impl Into<QualifiedName>, column: impl Into<String>) -> Self {
        self.references = Some(References {
            table: table.into(),
            column: column.into(),
            on_delete: OnDelete::NoAction,
        });
        self
    }

    pub fn on_delete(mut self, action: OnDelete) -> Self {
        if let Some(references) = &mut self.references {
            references.on_delete = action;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.name)?;
        self.data_type.validate()?;
        if let Some(default) = &self.default {
            default.validate()?;
        }
        if let Some(references) = &self.references {
            references.table.validate()?;
            validate_identifier(&references.column)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_builder() {
        let table = TableDef::new("public.space")
            .column(ColumnDef::id())
            .column(ColumnDef::new("name", DataType::Text).not_null())
            .column(ColumnDef::new("property_id", DataType::Uuid).references("public.property", "id"))
            .column(ColumnDef::deleted_at());

        assert_eq!(table.columns.len(), 4);
        assert!(table.columns[0].primary_key);
        assert!(!table.columns[0].nullable);
        assert!(table.find_column("deleted_at").unwrap().nullable);
        assert!(table.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_column() {
        let table = TableDef::new("space").column(ColumnDef::new("Name", DataType::Text));
        assert!(table.validate().is_err());
    }
}
