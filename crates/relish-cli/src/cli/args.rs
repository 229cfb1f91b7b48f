use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "relish",
    version,
    about = "BDD scenario runner: retrying steps, isolated parallel workers, deterministic reports"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Execute the scenarios of one or more feature files
    Run(RunArgs),
    /// Parse features and configuration without running anything
    Check(CheckArgs),
    /// List the registered step patterns
    Steps,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Feature files (YAML), run in the order given
    #[arg(required = true)]
    pub features: Vec<PathBuf>,

    /// Run configuration file (YAML); flags below override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Concurrent scenario workers
    #[arg(long)]
    pub workers: Option<usize>,

    /// Classify steps without executing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Stop dispatching new scenarios after the first failure
    #[arg(long)]
    pub fail_fast: bool,

    /// Results directory
    #[arg(long, env = "RELISH_RESULTS_DIR")]
    pub results: Option<PathBuf>,

    /// Allow a pre-existing results directory
    #[arg(long)]
    pub reuse_results: bool,

    /// Skip scenarios carrying this tag (repeatable; replaces the default set)
    #[arg(long = "skip-tag")]
    pub skip_tags: Vec<String>,

    /// Default retry timeout for retryable steps, in seconds
    #[arg(long)]
    pub step_timeout: Option<u64>,

    /// Fixed poll interval between retry attempts, in milliseconds
    #[arg(long)]
    pub poll_interval: Option<u64>,
}

#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Feature files (YAML) to validate
    #[arg(required = true)]
    pub features: Vec<PathBuf>,

    /// Run configuration file (YAML) to validate alongside
    #[arg(long)]
    pub config: Option<PathBuf>,
}
