//! CLI argument definitions using clap derive API

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// strata - versioned, reversible PostgreSQL schema migrations
#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Arguments shared by every command
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// PostgreSQL connection URL
    #[arg(short = 'd', long, global = true, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Path to strata.toml
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply pending migrations
    Up(UpArgs),

    /// Roll back applied migrations
    Down(DownArgs),

    /// Show applied, pending and orphaned migrations
    Status,

    /// Print the SQL pending migrations would run
    Plan(PlanArgs),

    /// Drop and recreate a materialized projection view
    Rebuild(RebuildArgs),
}

#[derive(Args, Debug)]
pub struct UpArgs {
    /// Stop after this version (YYYYMMDDHHMMSS)
    #[arg(long)]
    pub to: Option<String>,
}

#[derive(Args, Debug)]
pub struct DownArgs {
    /// Number of migrations to roll back
    #[arg(short, long, default_value_t = 1, conflicts_with = "batch")]
    pub steps: usize,

    /// Roll back the whole latest batch
    #[arg(short, long)]
    pub batch: bool,
}

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Stop after this version (YYYYMMDDHHMMSS)
    #[arg(long)]
    pub to: Option<String>,

    /// Plan against an empty ledger without connecting
    #[arg(long)]
    pub offline: bool,
}

#[derive(Args, Debug)]
pub struct RebuildArgs {
    /// View name, `schema.name` or bare name
    pub view: String,
}
