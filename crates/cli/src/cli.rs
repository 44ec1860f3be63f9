use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Inspect and exercise a weft worker pool.
///
/// The pool is configured from an optional TOML file, then `WEFT_*`
/// environment variables (a `.env` file is honoured), then the flags below.
#[derive(Parser, Debug)]
#[command(name = "weft", version, about = "Inspect and exercise a weft worker pool")]
pub struct CliArgs {
    /// Path to a pool config file (TOML)
    #[arg(long, global = true, env = "WEFT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Run exactly this many workers, overriding the config
    #[arg(long, global = true)]
    pub threads: Option<usize>,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Report the cache tiers each worker thread sees
    Probe,

    /// Time a parallel-for over synthetic work
    Bench {
        /// Number of items to process
        #[arg(long, default_value_t = 100_000)]
        items: usize,

        /// Hash rounds per item
        #[arg(long, default_value_t = 1_000)]
        rounds: u32,

        /// Pool jobs to use (default: one per worker, 0 runs inline)
        #[arg(long)]
        jobs: Option<usize>,

        /// Cap on concurrently running jobs
        #[arg(long)]
        max_concurrent: Option<usize>,
    },

    /// Print the resolved configuration
    Config,
}
