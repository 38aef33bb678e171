//! protdb CLI Library
//!
//! Command-line interface for generating versioned protein databases.
//!
//! # Overview
//!
//! - **Generation**: build every FASTA, decoy and category file for a set of
//!   species and variants (`protdb run`)
//! - **Planning**: show the job graph and its paths without running anything
//!   (`protdb plan`)
//! - **Catalogue**: list supported species and database variants
//!   (`protdb species`)

pub mod commands;
pub mod error;
pub mod progress;

// Re-export commonly used types
pub use error::{CliError, Result};

use clap::{Args, Parser, Subcommand};
use protdb_pipeline::scheduler::DEFAULT_CONCURRENCY;
use protdb_pipeline::Grid;
use std::path::PathBuf;

/// protdb - protein database generation pipeline
#[derive(Parser, Debug)]
#[command(name = "protdb")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Tool configuration file (defaults to ./protdb.yml when present)
    #[arg(short, long, env = "PROTDB_CONFIG", global = true)]
    pub config: Option<PathBuf>,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate the databases for a set of species and variants
    Run(RunArgs),

    /// Show the jobs a run would execute, without executing them
    Plan(SelectionArgs),

    /// List supported species and database variants
    Species,
}

/// What to build and where
#[derive(Args, Debug, Clone)]
pub struct SelectionArgs {
    /// Species to build, comma separated (e.g. human,mouse)
    #[arg(short = 's', long, value_delimiter = ',', required = true)]
    pub species_list: Vec<String>,

    /// Database variants, comma separated (pro-sw, pro-sw-tr, uni-sw, uni-sw-tr).
    /// Without variants only the category files are built.
    #[arg(short = 'f', long, value_delimiter = ',')]
    pub variant_list: Vec<String>,

    /// Version tag of the generated files, YYYYMM[.suffix] (defaults to the current month)
    #[arg(short, long)]
    pub date_tag: Option<String>,

    /// Root directory for generated databases
    #[arg(short, long, env = "PROTDB_OUTPUT_DIR", default_value = "dbs")]
    pub output_dir: PathBuf,

    /// Root directory for job logs and run reports
    #[arg(short, long, env = "PROTDB_LOG_DIR", default_value = "logs")]
    pub log_dir: PathBuf,

    /// Limit the run to one sub-grid: all, fasta or categories
    #[arg(short, long, default_value = "all")]
    pub grid: Grid,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Maximum number of tools running at once
    #[arg(short = 'j', long, env = "PROTDB_CONCURRENCY", default_value_t = DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    /// Kill a tool after this many seconds and mark its job failed
    #[arg(short, long, env = "PROTDB_TIMEOUT_SECS")]
    pub timeout: Option<u64>,

    /// Keep outputs a previous run with the same date tag completed
    #[arg(long)]
    pub skip_existing: bool,
}
