use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use nom::{
    bytes::complete::take_while_m_n,
    character::complete::char,
    combinator::{all_consuming, opt, rest},
    sequence::{pair, preceded},
    IResult,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ident::validate_identifier;

/// A migration version: a UTC timestamp written `YYYYMMDDHHMMSS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(u64);

fn timestamp(input: &str) -> IResult<&str, &str> {
    take_while_m_n(14, 14, |c: char| c.is_ascii_digit())(input)
}

fn unit_id(input: &str) -> IResult<&str, (&str, Option<&str>)> {
    pair(timestamp, opt(preceded(char('_'), rest)))(input)
}

fn checked(digits: &str, original: &str) -> Result<Version> {
    NaiveDateTime::parse_from_str(digits, "%Y%m%d%H%M%S")
        .map_err(|_| Error::InvalidVersion(original.to_string()))?;
    digits
        .parse()
        .map(Version)
        .map_err(|_| Error::InvalidVersion(original.to_string()))
}

/// Split `YYYYMMDDHHMMSS[_name]` into its version and optional name.
pub fn parse_unit_id(id: &str) -> Result<(Version, Option<String>)> {
    let (_, (digits, name)) =
        all_consuming(unit_id)(id).map_err(|_| Error::InvalidVersion(id.to_string()))?;
    let version = checked(digits, id)?;
    let name = match name {
        Some(name) => {
            validate_identifier(name)?;
            Some(name.to_string())
        }
        None => None,
    };
    Ok((version, name))
}

impl Version {
    /// Parse a version, ignoring any `_name` suffix.
    pub fn parse(s: &str) -> Result<Self> {
        parse_unit_id(s).map(|(version, _)| version)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Version::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:014}", self.0)
    }
}
