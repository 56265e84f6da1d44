//! Identifier and label allow-list.
//!
//! Names that end up inside generated SQL are checked here first. Quoting is
//! still applied on output, the allow-list just keeps caller-supplied names
//! boring enough that no quoting trick matters.

use nom::{
    bytes::complete::{take_while, take_while1},
    character::complete::satisfy,
    combinator::{all_consuming, recognize},
    sequence::pair,
    IResult,
};

use crate::error::{Error, Result};

/// PostgreSQL truncates names longer than `NAMEDATALEN - 1` bytes.
pub const MAX_NAME_LEN: usize = 63;

/// Parse an identifier: `[a-z_][a-z0-9_]*`.
pub fn parse_identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c| c.is_ascii_lowercase() || c == '_'),
        take_while(|c: char| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'),
    ))(input)
}

/// Parse an enum label: `[A-Za-z0-9_ -]+`.
pub fn parse_label(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == ' ' || c == '-')(input)
}

/// Check a single identifier against the allow-list.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.len() > MAX_NAME_LEN || all_consuming(parse_identifier)(name).is_err() {
        return Err(Error::InvalidIdentifier(name.to_string()));
    }
    Ok(())
}

/// Check an enum label against the allow-list.
pub fn validate_label(label: &str) -> Result<()> {
    if label.len() > MAX_NAME_LEN || all_consuming(parse_label)(label).is_err() {
        return Err(Error::InvalidLabel(label.to_string()));
    }
    Ok(())
}

/// Quote an identifier for PostgreSQL.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal for PostgreSQL.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_snake_case() {
        assert!(validate_identifier("organisation_type").is_ok());
        assert!(validate_identifier("_strata_migrations").is_ok());
        assert!(validate_identifier("space2").is_ok());
    }

    #[test]
    fn test_rejects_injection_and_case() {
        for bad in ["", "Users", "2fast", "a-b", "x\"; DROP TABLE y; --", "a b", "a.b"] {
            assert!(validate_identifier(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_rejects_long_identifier() {
        let long = "a".repeat(MAX_NAME_LEN + 1);
        assert!(matches!(validate_identifier(&long), Err(Error::InvalidIdentifier(_))));
        assert!(validate_identifier(&"a".repeat(MAX_NAME_LEN)).is_ok());
    }

    #[test]
    fn test_labels() {
        assert!(validate_label("SUBMITTED").is_ok());
        assert!(validate_label("in review").is_ok());
        assert!(validate_label("part-time").is_ok());
        assert!(validate_label("").is_err());
        assert!(validate_label("it's").is_err());
    }

    #[test]
    fn test_quoting() {
        assert_eq!(quote_identifier("space"), "\"space\"");
        assert_eq!(quote_literal("O'Brien"), "'O''Brien'");
    }
}
