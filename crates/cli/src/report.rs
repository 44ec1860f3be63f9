use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;
use weft_pool::{broadcast, JobContext, Parallel, Pool, QueueStats, Scope};

/// Random tag stored in each tier; two workers see the same tag exactly
/// when they share that tier's instance.
struct TierTag(Uuid);

impl Default for TierTag {
    fn default() -> Self {
        TierTag(Uuid::new_v4())
    }
}

#[derive(Debug, Serialize)]
pub struct WorkerIdentity {
    pub arrival: usize,
    pub worker: usize,
    pub thread_name: Option<String>,
    pub thread_tier: Uuid,
    pub instance_tier: Uuid,
    pub process_tier: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ProbeReport {
    pub pool_id: Uuid,
    pub num_threads: usize,
    pub distinct_thread_tiers: usize,
    pub distinct_instance_tiers: usize,
    pub distinct_process_tiers: usize,
    pub workers: Vec<WorkerIdentity>,
}

/// Visit every worker once and record which tier instances it sees.
pub fn probe(pool: &Pool) -> Result<ProbeReport> {
    let mut workers = broadcast(pool, |arrival| {
        let ctx = JobContext::current().context("probe is not running on a worker")?;
        let scopes = ctx.scopes();
        Ok::<_, anyhow::Error>(WorkerIdentity {
            arrival,
            worker: ctx.worker_index(),
            thread_name: thread::current().name().map(str::to_owned),
            thread_tier: scopes.get::<TierTag>(Scope::Thread).0,
            instance_tier: scopes.get::<TierTag>(Scope::Instance).0,
            process_tier: scopes.get::<TierTag>(Scope::Process).0,
        })
    })
    .context("worker probe failed")?;
    workers.sort_by_key(|w| w.worker);

    let distinct = |tier: fn(&WorkerIdentity) -> Uuid| {
        workers.iter().map(tier).collect::<HashSet<_>>().len()
    };
    Ok(ProbeReport {
        pool_id: pool.id(),
        num_threads: pool.num_threads(),
        distinct_thread_tiers: distinct(|w| w.thread_tier),
        distinct_instance_tiers: distinct(|w| w.instance_tier),
        distinct_process_tiers: distinct(|w| w.process_tier),
        workers,
    })
}

#[derive(Debug, Serialize)]
pub struct BenchReport {
    pub items: usize,
    pub rounds: u32,
    pub jobs: usize,
    pub max_concurrent: Option<usize>,
    pub elapsed_ms: f64,
    pub items_per_sec: f64,
    pub checksum: u64,
    pub stats: QueueStats,
}

/// Options for [`bench`].
#[derive(Debug, Clone, Copy)]
pub struct BenchOptions {
    pub items: usize,
    pub rounds: u32,
    pub jobs: Option<usize>,
    pub max_concurrent: Option<usize>,
}

/// Run `rounds` of an LCG over every item in parallel.
pub fn bench(pool: &Pool, opts: BenchOptions) -> Result<BenchReport> {
    let jobs = opts.jobs.unwrap_or(pool.num_threads());
    let mut parallel = Parallel::new(Some(pool)).threads(jobs);
    if let Some(max) = opts.max_concurrent {
        parallel = parallel.max_concurrent(max);
    }

    let checksum = Arc::new(AtomicU64::new(0));
    let acc = Arc::clone(&checksum);
    let rounds = opts.rounds;
    let data: Vec<u64> = (0..opts.items as u64).collect();

    debug!(items = opts.items, jobs, "starting bench");
    let start = Instant::now();
    parallel
        .range(data, move |&x: &u64| {
            acc.fetch_add(mix(x, rounds), Ordering::Relaxed);
            Ok::<_, anyhow::Error>(())
        })
        .context("bench run failed")?;
    let elapsed = start.elapsed();

    let secs = elapsed.as_secs_f64();
    Ok(BenchReport {
        items: opts.items,
        rounds,
        jobs,
        max_concurrent: opts.max_concurrent,
        elapsed_ms: secs * 1_000.0,
        items_per_sec: if secs > 0.0 { opts.items as f64 / secs } else { 0.0 },
        checksum: checksum.load(Ordering::Relaxed),
        stats: pool.stats(),
    })
}

fn mix(seed: u64, rounds: u32) -> u64 {
    let mut h = seed;
    for _ in 0..rounds {
        h = h
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
    }
    h
}

#[cfg(test)]
mod tests {
    use weft_pool::PoolConfig;

    use super::*;

    #[test]
    fn probe_counts_tier_instances() {
        let pool = Pool::construct(PoolConfig::fixed(3)).unwrap();
        let report = probe(&pool).unwrap();
        assert_eq!(report.num_threads, 3);
        assert_eq!(report.workers.len(), 3);
        assert_eq!(report.distinct_thread_tiers, 3);
        assert_eq!(report.distinct_instance_tiers, 1);
        assert_eq!(report.distinct_process_tiers, 1);
        let indices: Vec<_> = report.workers.iter().map(|w| w.worker).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn bench_checksum_matches_serial_run() {
        let pool = Pool::construct(PoolConfig::fixed(2)).unwrap();
        let expected = (0..500u64).fold(0u64, |acc, x| acc.wrapping_add(mix(x, 10)));
        for jobs in [None, Some(0), Some(3)] {
            let report = bench(
                &pool,
                BenchOptions {
                    items: 500,
                    rounds: 10,
                    jobs,
                    max_concurrent: Some(2),
                },
            )
            .unwrap();
            assert_eq!(report.checksum, expected);
        }
    }

    #[test]
    fn bench_report_serializes() {
        let pool = Pool::construct(PoolConfig::fixed(1)).unwrap();
        let opts = BenchOptions {
            items: 10,
            rounds: 1,
            jobs: None,
            max_concurrent: None,
        };
        let json = serde_json::to_value(bench(&pool, opts).unwrap()).unwrap();
        assert_eq!(json["items"], 10);
        assert!(json["stats"]["submitted"].as_u64().unwrap() >= 2);
    }
}
