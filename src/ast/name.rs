use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ident::{quote_identifier, validate_identifier};

/// Schema used when a name carries none.
pub const DEFAULT_SCHEMA: &str = "public";

/// A possibly schema-qualified object name (`schema.name` or `name`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QualifiedName {
    pub schema: Option<String>,
    pub name: String,
}

impl QualifiedName {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
        }
    }

    pub fn in_schema(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: Some(schema.into()),
            name: name.into(),
        }
    }

    /// The schema, falling back to `public`.
    pub fn schema(&self) -> &str {
        self.schema.as_deref().unwrap_or(DEFAULT_SCHEMA)
    }

    /// The same name with the schema spelled out.
    pub fn resolved(&self) -> Self {
        Self::in_schema(self.schema(), self.name.clone())
    }

    /// Another object in the same schema.
    pub fn sibling(&self, name: impl Into<String>) -> Self {
        Self {
            schema: self.schema.clone(),
            name: name.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(schema) = &self.schema {
            validate_identifier(schema)?;
        }
        validate_identifier(&self.name)
    }

    /// Quoted SQL form, e.g. `"public"."space"`.
    pub fn quoted(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", quote_identifier(schema), quote_identifier(&self.name)),
            None => quote_identifier(&self.name),
        }
    }
}

impl From<&str> for QualifiedName {
    fn from(s: &str) -> Self {
        match s.split_once('.') {
            Some((schema, name)) => Self::in_schema(schema, name),
            None => Self::new(s),
        }
    }
}

impl From<String> for QualifiedName {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<&QualifiedName> for QualifiedName {
    fn from(name: &QualifiedName) -> Self {
        name.clone()
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_quote() {
        let name = QualifiedName::from("public_api.property_listing");
        assert_eq!(name.schema(), "public_api");
        assert_eq!(name.quoted(), "\"public_api\".\"property_listing\"");

        let bare = QualifiedName::from("space");
        assert_eq!(bare.schema(), "public");
        assert_eq!(bare.quoted(), "\"space\"");
        assert_eq!(bare.resolved(), QualifiedName::from("public.space"));
    }

    #[test]
    fn test_validate() {
        assert!(QualifiedName::from("public.space").validate().is_ok());
        assert!(QualifiedName::from("public.Space").validate().is_err());
        assert!(QualifiedName::from("a.b.c").validate().is_err());
    }
}
