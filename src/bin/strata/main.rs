//! strata CLI

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use commands::{down, plan, rebuild, status, up};
use strata::config::StrataConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = StrataConfig::discover(cli.global.config.as_deref())?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Commands::Up(args) => up::execute(args, &cli.global, &config).await,
        Commands::Down(args) => down::execute(args, &cli.global, &config).await,
        Commands::Status => status::execute(&cli.global, &config).await,
        Commands::Plan(args) => plan::execute(args, &cli.global, &config).await,
        Commands::Rebuild(args) => rebuild::execute(args, &cli.global, &config).await,
    }
}
