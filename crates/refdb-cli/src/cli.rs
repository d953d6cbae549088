use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use refdb_batch::CommandResult;

#[derive(Parser)]
#[command(
    name = "refdb",
    about = "Global ref database tools: batch outcome classification and replica simulation",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// TOML configuration file; defaults apply when absent
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Classify the per-command results of one batch
    Classify(ClassifyArgs),
    /// Run concurrent replicas against an in-memory global ref database
    Simulate(SimulateArgs),
    /// Print the effective configuration
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct ClassifyArgs {
    /// Results in command order: ok, lock-failure, rejected, aborted
    #[arg(required = true)]
    pub results: Vec<CommandResult>,
}

#[derive(Args)]
pub struct SimulateArgs {
    /// Number of concurrent replicas
    #[arg(short, long, default_value = "4")]
    pub replicas: usize,
    /// Batches each replica submits
    #[arg(short, long, default_value = "10")]
    pub batches: usize,
    /// Refs updated by every batch
    #[arg(long, default_value = "3")]
    pub refs: usize,
    /// Project the refs belong to
    #[arg(short, long, default_value = "simulation")]
    pub project: String,
}

#[derive(Args)]
pub struct ConfigArgs {}
