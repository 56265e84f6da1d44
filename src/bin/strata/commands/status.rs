//! `strata status`

use anyhow::Result;
use colored::*;
use strata::config::StrataConfig;
use strata::migrate::UnitState;

use super::{connect, runner};
use crate::cli::GlobalArgs;

pub async fn execute(global: &GlobalArgs, config: &StrataConfig) -> Result<()> {
    let runner = runner(config)?;
    let mut driver = connect(global, config).await?;
    let result = runner.status(&mut driver).await;
    driver.close().await.ok();
    let statuses = result?;

    println!("{}", "📋 Migration Status".cyan().bold());
    println!();

    let mut pending = 0;
    for status in &statuses {
        match &status.state {
            UnitState::Applied { batch, applied_at } => println!(
                "  {} {} {} {}",
                "✓".green(),
                status.version.to_string().yellow(),
                status.name,
                format!("(batch {}, {})", batch, applied_at.format("%Y-%m-%d %H:%M:%S")).dimmed()
            ),
            UnitState::Pending => {
                pending += 1;
                println!("  {} {} {}", "○".dimmed(), status.version.to_string().yellow(), status.name);
            }
            UnitState::Orphaned { batch, .. } => println!(
                "  {} {} {} {}",
                "?".red().bold(),
                status.version.to_string().yellow(),
                status.name,
                format!("(batch {}, no such migration)", batch).red()
            ),
        }
    }

    println!();
    if pending == 0 {
        println!("{}", "Up to date.".green());
    } else {
        println!("{} {} pending", "Pending:".cyan(), pending);
    }
    Ok(())
}
