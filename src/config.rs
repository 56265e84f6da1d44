//! `strata.toml` configuration.
//!
//! Lookup order: an explicit path, `./strata.toml`, then
//! `<config dir>/strata/strata.toml`. With no file, defaults apply.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::ast::QualifiedName;
use crate::error::{Error, Result};
use crate::ident::validate_identifier;
use crate::migrate::{RunnerConfig, DEFAULT_LEDGER_TABLE, DEFAULT_LOCK_KEY};

pub const CONFIG_FILE: &str = "strata.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrataConfig {
    /// Overridden by `--database-url` / `DATABASE_URL`.
    #[serde(default)]
    pub database_url: Option<String>,

    #[serde(default = "default_ledger_table")]
    pub ledger_table: String,

    #[serde(default)]
    pub ledger_schema: Option<String>,

    #[serde(default = "default_lock_key")]
    pub lock_key: i64,

    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` wins.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_ledger_table() -> String {
    DEFAULT_LEDGER_TABLE.to_string()
}

fn default_lock_key() -> i64 {
    DEFAULT_LOCK_KEY
}

fn default_log_filter() -> String {
    "strata=info".to_string()
}

impl Default for StrataConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            ledger_table: default_ledger_table(),
            ledger_schema: None,
            lock_key: default_lock_key(),
            log_filter: default_log_filter(),
        }
    }
}

impl StrataConfig {
    /// Parse and validate TOML text. `origin` names the source in errors.
    pub fn from_toml_str(content: &str, origin: &str) -> Result<Self> {
        let config: StrataConfig = toml::from_str(content).map_err(|e| Error::Config {
            path: origin.to_string(),
            message: e.message().to_string(),
        })?;
        config.validate().map_err(|e| Error::Config {
            path: origin.to_string(),
            message: e.to_string(),
        })?;
        Ok(config)
    }

    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::Config {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&content, &path.display().to_string())
    }

    /// Load the first file found in lookup order, or defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match candidate_paths().into_iter().find(|p| p.is_file()) {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.ledger_table)?;
        if let Some(schema) = &self.ledger_schema {
            validate_identifier(schema)?;
        }
        Ok(())
    }

    pub fn ledger_table_name(&self) -> QualifiedName {
        match &self.ledger_schema {
            Some(schema) => QualifiedName::in_schema(schema.clone(), self.ledger_table.clone()),
            None => QualifiedName::new(self.ledger_table.clone()),
        }
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            ledger_table: self.ledger_table_name(),
            lock_key: self.lock_key,
        }
    }
}

fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(CONFIG_FILE)];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("strata").join(CONFIG_FILE));
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StrataConfig::from_toml_str("", "inline").unwrap();
        assert_eq!(config, StrataConfig::default());
        assert_eq!(config.runner_config(), RunnerConfig::default());
    }

    #[test]
    fn test_full_file() {
        let config = StrataConfig::from_toml_str(
            r#"
database_url = "postgres://localhost/app"
ledger_table = "schema_history"
ledger_schema = "ops"
lock_key = 42
log_filter = "strata=debug"
"#,
            "inline",
        )
        .unwrap();
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/app"));
        assert_eq!(config.ledger_table_name().to_string(), "ops.schema_history");
        assert_eq!(config.runner_config().lock_key, 42);
    }

    #[test]
    fn test_rejects_unknown_keys_and_bad_names() {
        assert!(matches!(
            StrataConfig::from_toml_str("ledger = 1", "inline"),
            Err(Error::Config { .. })
        ));
        assert!(matches!(
            StrataConfig::from_toml_str("ledger_table = \"Bad Name\"", "inline"),
            Err(Error::Config { .. })
        ));
    }

    #[test]
    fn test_missing_explicit_file() {
        let err = StrataConfig::discover(Some(Path::new("/nonexistent/strata.toml"))).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
