//! Command implementations

pub mod down;
pub mod plan;
pub mod rebuild;
pub mod status;
pub mod up;

use anyhow::{Context, Result};
use strata::config::StrataConfig;
use strata::driver::PgDriver;
use strata::migrate::{Runner, Version};

use crate::cli::GlobalArgs;

/// `--database-url` / `DATABASE_URL`, then the config file.
pub fn database_url<'a>(global: &'a GlobalArgs, config: &'a StrataConfig) -> Result<&'a str> {
    global
        .database_url
        .as_deref()
        .or(config.database_url.as_deref())
        .context("No database URL: pass --database-url, set DATABASE_URL or add database_url to strata.toml")
}

pub async fn connect(global: &GlobalArgs, config: &StrataConfig) -> Result<PgDriver> {
    let url = database_url(global, config)?;
    PgDriver::connect(url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect: {}", e))
}

pub fn runner(config: &StrataConfig) -> Result<Runner> {
    Ok(strata::catalog::runner(config.runner_config())?)
}

pub fn parse_target(to: Option<&str>) -> Result<Option<Version>> {
    to.map(|v| Version::parse(v).with_context(|| format!("Invalid target version '{}'", v)))
        .transpose()
}
