use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "vellum",
    about = "Inspect and maintain Vellum stores",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Database configuration file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Summarize collections, record types and views
    Inspect(StoreArgs),
    /// List materialized view indices
    Views(StoreArgs),
    /// Show one stored object with its metadata
    Get(GetArgs),
    /// Drop view indices no application has registered
    Prune(PruneArgs),
    /// Write a checkpoint and truncate the log
    Checkpoint(StoreArgs),
    /// Print the effective configuration as TOML
    Config,
}

#[derive(Args)]
pub struct StoreArgs {
    /// Store directory
    pub path: PathBuf,
}

#[derive(Args)]
pub struct GetArgs {
    pub path: PathBuf,
    pub collection: String,
    pub key: String,
}

#[derive(Args)]
pub struct PruneArgs {
    pub path: PathBuf,
    /// List what would be dropped without changing the store
    #[arg(long)]
    pub dry_run: bool,
}
