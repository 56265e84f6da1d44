//! `strata down`

use anyhow::Result;
use colored::*;
use strata::config::StrataConfig;

use super::{connect, runner};
use crate::cli::{DownArgs, GlobalArgs};

pub async fn execute(args: &DownArgs, global: &GlobalArgs, config: &StrataConfig) -> Result<()> {
    let runner = runner(config)?;
    let mut driver = connect(global, config).await?;

    println!("{} {}", "Migrating DOWN:".cyan().bold(), config.ledger_table_name().to_string().yellow());

    let result = if args.batch {
        runner.rollback_batch(&mut driver).await
    } else {
        runner.rollback(&mut driver, args.steps).await
    };
    driver.close().await.ok();
    let report = result?;

    if report.rolled_back.is_empty() {
        println!("{}", "Nothing to roll back.".green());
        return Ok(());
    }
    for version in &report.rolled_back {
        let name = runner.unit(*version).map(|u| u.name()).unwrap_or_default();
        println!("  {} {} {}", "↩".yellow(), version.to_string().yellow(), name);
    }
    println!("{} {} migration(s) rolled back", "✓".green().bold(), report.rolled_back.len());
    Ok(())
}
