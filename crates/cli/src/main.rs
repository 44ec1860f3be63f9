mod cli;
mod report;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::info;
use weft_core::{load_dotenv, PoolConfig};
use weft_pool::Pool;

use crate::cli::{CliArgs, Command};
use crate::report::BenchOptions;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    load_dotenv();
    let args = CliArgs::parse();

    let mut config =
        PoolConfig::load(args.config.as_deref()).context("failed to load pool configuration")?;
    if let Some(threads) = args.threads {
        config.min_threads = threads;
        config.max_threads = threads;
        config.adaptive_threads = false;
        config.validate().context("invalid --threads")?;
    }
    config.log_summary();

    match args.command {
        Command::Config => print_json(&config, args.pretty),
        Command::Probe => {
            let pool = Pool::construct(config).context("failed to start pool")?;
            let report = report::probe(&pool)?;
            info!(pool = %report.pool_id, threads = report.num_threads, "probe finished");
            print_json(&report, args.pretty)
        }
        Command::Bench {
            items,
            rounds,
            jobs,
            max_concurrent,
        } => {
            let pool = Pool::construct(config).context("failed to start pool")?;
            let report = report::bench(
                &pool,
                BenchOptions {
                    items,
                    rounds,
                    jobs,
                    max_concurrent,
                },
            )?;
            info!(elapsed_ms = report.elapsed_ms, "bench finished");
            print_json(&report, args.pretty)
        }
    }
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{out}");
    Ok(())
}
