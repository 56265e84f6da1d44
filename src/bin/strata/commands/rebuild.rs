//! `strata rebuild <view>`

use anyhow::Result;
use colored::*;
use strata::catalog::views;
use strata::config::StrataConfig;

use super::{connect, runner};
use crate::cli::{GlobalArgs, RebuildArgs};

pub async fn execute(args: &RebuildArgs, global: &GlobalArgs, config: &StrataConfig) -> Result<()> {
    let Some(view) = views::find(&args.view) else {
        let known: Vec<String> = views::current().iter().map(|v| v.name.to_string()).collect();
        anyhow::bail!("Unknown view '{}' (known: {})", args.view, known.join(", "));
    };
    let runner = runner(config)?;

    let mut driver = connect(global, config).await?;
    println!("{} {}", "Rebuilding:".cyan().bold(), view.name.to_string().yellow());
    let result = runner.rebuild_view(&mut driver, &view).await;
    driver.close().await.ok();
    result?;

    println!("{} {} index(es) recreated", "✓".green(), view.indexes.len());
    Ok(())
}
