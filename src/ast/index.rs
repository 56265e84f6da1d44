use serde::{Deserialize, Serialize};

use crate::ast::QualifiedName;
use crate::error::Result;
use crate::ident::validate_identifier;

/// An index over a table or materialized view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    pub name: String,
    pub table: QualifiedName,
    pub columns: Vec<String>,
    pub unique: bool,
    pub method: IndexMethod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IndexMethod {
    #[default]
    BTree,
    /// Spatial and range indexes.
    Gist,
    Gin,
}

impl IndexDef {
    pub fn new<I, S>(name: impl Into<String>, table: impl Into<QualifiedName>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            table: table.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
            method: IndexMethod::BTree,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn using(mut self, method: IndexMethod) -> Self {
        self.method = method;
        self
    }

    /// Indexes live in the schema of the relation they cover.
    pub fn qualified_name(&self) -> QualifiedName {
        self.table.sibling(self.name.clone())
    }

    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.name)?;
        self.table.validate()?;
        if self.columns.is_empty() {
            return Err(crate::error::Error::InvalidIdentifier(String::new()));
        }
        for col in &self.columns {
            validate_identifier(col)?;
        }
        Ok(())
    }
}
