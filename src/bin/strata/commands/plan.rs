//! `strata plan`

use anyhow::Result;
use colored::*;
use strata::config::StrataConfig;
use strata::migrate::Ledger;

use super::{connect, parse_target, runner};
use crate::cli::{GlobalArgs, PlanArgs};

pub async fn execute(args: &PlanArgs, global: &GlobalArgs, config: &StrataConfig) -> Result<()> {
    let target = parse_target(args.to.as_deref())?;
    let runner = runner(config)?;

    let plan = if args.offline {
        runner.plan(&Ledger::default(), target)?
    } else {
        let mut driver = connect(global, config).await?;
        let result = runner.plan_against(&mut driver, target).await;
        driver.close().await.ok();
        result?
    };

    if plan.is_empty() {
        println!("{}", "No migrations to apply.".green());
        return Ok(());
    }

    println!("{} {} migration(s)", "📝 Plan:".cyan().bold(), plan.len());
    for unit in &plan {
        println!();
        println!("-- {} {}", unit.version.to_string().yellow(), unit.name.bold());
        for sql in &unit.statements {
            println!("{};", sql);
        }
    }
    Ok(())
}
