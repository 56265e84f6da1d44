use serde::{Deserialize, Serialize};

use crate::ast::QualifiedName;
use crate::error::Result;
use crate::ident::validate_label;

/// Column data types understood by the transpiler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Uuid,
    Text,
    Varchar(u32),
    Integer,
    BigInt,
    Boolean,
    Date,
    Timestamptz,
    Numeric { precision: u8, scale: u8 },
    Jsonb,
    /// PostGIS geometry, e.g. `geometry(Point, 4326)`.
    Geometry { kind: GeometryKind, srid: i32 },
    /// A native enum type.
    Enum(QualifiedName),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeometryKind {
    Point,
    Polygon,
    MultiPolygon,
}

impl DataType {
    pub fn enum_type(&self) -> Option<&QualifiedName> {
        match self {
            DataType::Enum(name) => Some(name),
            _ => None,
        }
    }

    /// Extension the type lives in, if any.
    pub fn required_extension(&self) -> Option<&'static str> {
        match self {
            DataType::Geometry { .. } => Some("postgis"),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            DataType::Enum(name) => name.validate(),
            _ => Ok(()),
        }
    }
}

/// Column defaults. Kept as a closed set so no raw SQL is ever accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DefaultValue {
    Now,
    RandomUuid,
    Bool(bool),
    Int(i64),
    Text(String),
    /// An enum label; the column's own type supplies the cast.
    EnumLabel(String),
    EmptyJsonArray,
}

impl DefaultValue {
    pub fn validate(&self) -> Result<()> {
        match self {
            DefaultValue::EnumLabel(label) => validate_label(label),
            _ => Ok(()),
        }
    }
}
