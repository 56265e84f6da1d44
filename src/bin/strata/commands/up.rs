//! `strata up`

use anyhow::Result;
use colored::*;
use strata::config::StrataConfig;

use super::{connect, parse_target, runner};
use crate::cli::{GlobalArgs, UpArgs};

pub async fn execute(args: &UpArgs, global: &GlobalArgs, config: &StrataConfig) -> Result<()> {
    let target = parse_target(args.to.as_deref())?;
    let runner = runner(config)?;
    let mut driver = connect(global, config).await?;

    println!("{} {}", "Migrating UP:".cyan().bold(), config.ledger_table_name().to_string().yellow());

    let result = runner.apply(&mut driver, target).await;
    driver.close().await.ok();
    let report = result?;

    if report.applied.is_empty() {
        println!("{}", "No migrations to apply.".green());
        return Ok(());
    }
    for version in &report.applied {
        let name = runner.unit(*version).map(|u| u.name()).unwrap_or_default();
        println!("  {} {} {}", "✓".green(), version.to_string().yellow(), name);
    }
    println!(
        "{} {} migration(s) applied in batch {}",
        "✓".green().bold(),
        report.applied.len(),
        report.batch.unwrap_or_default()
    );
    Ok(())
}
