use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ast::Transformation;
use crate::error::Result;
use crate::migrate::version::{parse_unit_id, Version};

/// Which half of a unit is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// A versioned, reversible schema change.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationUnit {
    version: Version,
    name: String,
    up: Transformation,
    down: Transformation,
}

impl MigrationUnit {
    /// Build a unit from an id such as `20230415120000_create_applications`.
    pub fn new(id: &str, up: Transformation, down: Transformation) -> Result<Self> {
        let (version, name) = parse_unit_id(id)?;
        Ok(Self {
            version,
            name: name.unwrap_or_default(),
            up,
            down,
        })
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn up(&self) -> &Transformation {
        &self.up
    }

    pub fn down(&self) -> &Transformation {
        &self.down
    }

    pub fn transformation(&self, direction: Direction) -> &Transformation {
        match direction {
            Direction::Up => &self.up,
            Direction::Down => &self.down,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.up.validate()?;
        self.down.validate()
    }
}

impl fmt::Display for MigrationUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "{}", self.version)
        } else {
            write!(f, "{}_{}", self.version, self.name)
        }
    }
}
